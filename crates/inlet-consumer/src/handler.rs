//! Topic Handlers - per-topic business logic units
//!
//! Handlers are polymorphic over `TopicHandler` and must be safe to invoke
//! concurrently by multiple workers. The simulated handler models real work
//! with a declared latency profile and an injectable failure plan; baked-in
//! randomness never reaches production wiring (`FailurePlan::Never`).

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use tracing::debug;

use inlet_common::{HandlerError, MessageEnvelope, TopicConfig};

/// Business-logic unit for a single topic.
#[async_trait]
pub trait TopicHandler: Send + Sync {
    async fn process(&self, envelope: &MessageEnvelope) -> Result<(), HandlerError>;
}

/// Injectable failure-classification strategy for simulated handlers.
pub enum FailurePlan {
    /// Always succeed (production wiring)
    Never,
    /// Fail with the given probabilities per attempt (demo wiring)
    Chance { transient: f64, permanent: f64 },
    /// Pop the next planned result per attempt; succeeds once exhausted (tests)
    Scripted(Mutex<VecDeque<Result<(), HandlerError>>>),
}

impl FailurePlan {
    pub fn scripted(outcomes: Vec<Result<(), HandlerError>>) -> Self {
        FailurePlan::Scripted(Mutex::new(outcomes.into()))
    }

    fn decide(&self) -> Result<(), HandlerError> {
        match self {
            FailurePlan::Never => Ok(()),
            FailurePlan::Chance { transient, permanent } => {
                let mut rng = rand::rng();
                if rng.random_bool(*transient) {
                    Err(HandlerError::Transient("injected transient failure".to_string()))
                } else if rng.random_bool(*permanent) {
                    Err(HandlerError::Permanent("injected permanent failure".to_string()))
                } else {
                    Ok(())
                }
            }
            FailurePlan::Scripted(outcomes) => outcomes.lock().pop_front().unwrap_or(Ok(())),
        }
    }
}

/// Handler that executes a list of named processing steps with a configured
/// nominal latency, standing in for real downstream work.
pub struct SimulatedHandler {
    topic: String,
    steps: Vec<&'static str>,
    step_delay: Duration,
    failure_plan: FailurePlan,
}

impl SimulatedHandler {
    pub fn new(
        topic: impl Into<String>,
        steps: Vec<&'static str>,
        work_duration: Duration,
        failure_plan: FailurePlan,
    ) -> Self {
        let step_count = steps.len().max(1) as u32;
        Self {
            topic: topic.into(),
            steps,
            step_delay: work_duration / step_count,
            failure_plan,
        }
    }

    /// Build the production handler for a configured topic: known steps,
    /// the configured latency profile, and no injected failures.
    pub fn from_config(config: &TopicConfig) -> Self {
        Self::new(
            config.topic.clone(),
            steps_for_topic(&config.topic),
            Duration::from_millis(config.avg_work_ms),
            FailurePlan::Never,
        )
    }

    pub fn with_failure_plan(mut self, failure_plan: FailurePlan) -> Self {
        self.failure_plan = failure_plan;
        self
    }
}

#[async_trait]
impl TopicHandler for SimulatedHandler {
    async fn process(&self, envelope: &MessageEnvelope) -> Result<(), HandlerError> {
        for step in &self.steps {
            debug!(
                message_id = %envelope.id,
                topic = %self.topic,
                step = %step,
                "executing processing step"
            );
            if !self.step_delay.is_zero() {
                tokio::time::sleep(self.step_delay).await;
            }
        }
        self.failure_plan.decide()
    }
}

/// Processing steps per known topic; unknown topics get a generic pipeline.
fn steps_for_topic(topic: &str) -> Vec<&'static str> {
    match topic {
        "orders" => vec![
            "validate order",
            "check inventory",
            "process payment",
            "send confirmation",
        ],
        "users" => vec![
            "send welcome email",
            "create user profile",
            "initialize preferences",
        ],
        _ => vec!["validate", "apply"],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(id: &str, topic: &str) -> MessageEnvelope {
        MessageEnvelope::new(id, topic, json!({}))
    }

    #[tokio::test]
    async fn simulated_handler_succeeds_by_default() {
        let handler = SimulatedHandler::new("orders", vec!["validate"], Duration::ZERO, FailurePlan::Never);
        assert!(handler.process(&envelope("m-1", "orders")).await.is_ok());
    }

    #[tokio::test]
    async fn scripted_plan_replays_outcomes_in_order() {
        let handler = SimulatedHandler::new(
            "orders",
            vec!["validate"],
            Duration::ZERO,
            FailurePlan::scripted(vec![
                Err(HandlerError::Transient("not yet".into())),
                Ok(()),
            ]),
        );

        let first = handler.process(&envelope("m-1", "orders")).await;
        assert!(matches!(first, Err(HandlerError::Transient(_))));

        let second = handler.process(&envelope("m-1", "orders")).await;
        assert!(second.is_ok());

        // Exhausted plans succeed
        assert!(handler.process(&envelope("m-2", "orders")).await.is_ok());
    }

    #[tokio::test]
    async fn chance_plan_with_certain_failure() {
        let handler = SimulatedHandler::new(
            "orders",
            vec!["validate"],
            Duration::ZERO,
            FailurePlan::Chance { transient: 1.0, permanent: 0.0 },
        );
        let result = handler.process(&envelope("m-1", "orders")).await;
        assert!(matches!(result, Err(HandlerError::Transient(_))));
    }
}
