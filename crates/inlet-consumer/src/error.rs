use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConsumerError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("no handler registered for topic: {0}")]
    HandlerMissing(String),
}
