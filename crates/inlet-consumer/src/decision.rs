//! Retry Decision Engine - classifies a processing attempt's result
//!
//! A pure function of the handler's reported result. Unclassified errors
//! (including caught panics, surfaced as `HandlerError::Unexpected`) are
//! treated as transient so the middleware redelivers rather than silently
//! dropping data.

use inlet_common::{HandlerError, ProcessingOutcome};

/// Classify a single attempt's result.
pub fn classify(result: Result<(), HandlerError>) -> ProcessingOutcome {
    match result {
        Ok(()) => ProcessingOutcome::Success,
        Err(HandlerError::Transient(_)) => ProcessingOutcome::TransientFailure,
        Err(HandlerError::Permanent(_)) => ProcessingOutcome::PermanentFailure,
        Err(HandlerError::Unexpected(_)) => ProcessingOutcome::TransientFailure,
    }
}
