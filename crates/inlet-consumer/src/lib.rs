//! Inlet Event Consumer
//!
//! This crate provides the push-delivery consumer core with:
//! - Dispatcher: routes inbound deliveries to topic-dedicated pools
//! - TopicPool: bounded per-topic worker pools with independent concurrency
//! - Retry decision engine: classifies attempts into ack/retry/terminal
//! - IdempotencyTracker: at-most-once side effects under redelivery
//! - StatsAggregator: per-topic atomic counters with derived rates
//! - DeadLetterHandler: terminal sink for messages the middleware gave up on
//! - WarningService: in-memory operator alert channel
//! - HealthService: status derived from pool occupancy and warnings
//! - API: HTTP endpoints for delivery, subscriptions, health, and stats

pub mod api;
pub mod deadletter;
pub mod decision;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod health;
pub mod idempotency;
pub mod pool;
pub mod stats;
pub mod warning;

pub use deadletter::{DeadLetterHandler, DeadLetterSink, LoggingSink, SinkError};
pub use decision::classify;
pub use dispatcher::Dispatcher;
pub use error::ConsumerError;
pub use handler::{FailurePlan, SimulatedHandler, TopicHandler};
pub use health::{HealthService, HealthServiceConfig};
pub use idempotency::{IdempotencyStatus, IdempotencyTracker};
pub use pool::TopicPool;
pub use stats::StatsAggregator;
pub use warning::{WarningService, WarningServiceConfig};

pub type Result<T> = std::result::Result<T, ConsumerError>;
