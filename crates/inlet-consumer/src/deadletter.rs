//! Dead-Letter Handler - terminal sink for messages the middleware gave up on
//!
//! Invoked on a dedicated route after the middleware exhausts its own retry
//! budget. A dead-lettered message always terminates: the handler acks
//! unconditionally, and remediation failures go to the operator alert
//! channel, never back to the middleware.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::error;

use inlet_common::{Disposition, MessageEnvelope, WarningCategory, WarningSeverity};

use crate::stats::StatsAggregator;
use crate::warning::WarningService;

/// Failure inside remediation logic (persistence, alerting backends).
#[derive(Debug, Error)]
#[error("{0}")]
pub struct SinkError(pub String);

/// Remediation target for dead-lettered envelopes.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn remediate(&self, envelope: &MessageEnvelope) -> Result<(), SinkError>;
}

/// Default sink: records the full envelope for manual remediation.
pub struct LoggingSink;

#[async_trait]
impl DeadLetterSink for LoggingSink {
    async fn remediate(&self, envelope: &MessageEnvelope) -> Result<(), SinkError> {
        error!(
            message_id = %envelope.id,
            topic = %envelope.topic,
            payload = %envelope.payload,
            "Dead-lettered message recorded for manual remediation"
        );
        Ok(())
    }
}

pub struct DeadLetterHandler {
    sink: Arc<dyn DeadLetterSink>,
    stats: Arc<StatsAggregator>,
    warning_service: Option<Arc<WarningService>>,
}

impl DeadLetterHandler {
    pub fn new(sink: Arc<dyn DeadLetterSink>, stats: Arc<StatsAggregator>) -> Self {
        Self {
            sink,
            stats,
            warning_service: None,
        }
    }

    pub fn with_warning_service(mut self, warning_service: Arc<WarningService>) -> Self {
        self.warning_service = Some(warning_service);
        self
    }

    /// Handle a dead-lettered envelope. Always acks.
    pub async fn handle(&self, envelope: &MessageEnvelope) -> Disposition {
        error!(
            message_id = %envelope.id,
            topic = %envelope.topic,
            "Middleware exhausted its retry budget for message"
        );
        self.stats.on_dead_letter(&envelope.topic);

        if let Err(e) = self.sink.remediate(envelope).await {
            error!(
                message_id = %envelope.id,
                topic = %envelope.topic,
                error = %e,
                "Dead-letter remediation failed"
            );
            if let Some(ref ws) = self.warning_service {
                ws.add_warning(
                    WarningCategory::DeadLetter,
                    WarningSeverity::Critical,
                    format!(
                        "Remediation failed for dead-lettered message [{}] on topic [{}]: {}",
                        envelope.id, envelope.topic, e
                    ),
                    "DeadLetterHandler".to_string(),
                );
            }
        }

        Disposition::Ack
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FailingSink;

    #[async_trait]
    impl DeadLetterSink for FailingSink {
        async fn remediate(&self, _envelope: &MessageEnvelope) -> Result<(), SinkError> {
            Err(SinkError("storage unavailable".to_string()))
        }
    }

    #[tokio::test]
    async fn acks_when_sink_succeeds() {
        let stats = Arc::new(StatsAggregator::new());
        let handler = DeadLetterHandler::new(Arc::new(LoggingSink), stats.clone());

        let envelope = MessageEnvelope::new("msg-1", "orders", json!({"orderId": "o-1"}));
        assert_eq!(handler.handle(&envelope).await, Disposition::Ack);
        assert_eq!(stats.snapshot().topics["orders"].dead_lettered, 1);
    }

    #[tokio::test]
    async fn acks_even_when_sink_fails() {
        let stats = Arc::new(StatsAggregator::new());
        let warnings = Arc::new(WarningService::default());
        let handler = DeadLetterHandler::new(Arc::new(FailingSink), stats.clone())
            .with_warning_service(warnings.clone());

        let envelope = MessageEnvelope::new("msg-1", "orders", json!({}));
        assert_eq!(handler.handle(&envelope).await, Disposition::Ack);

        // Remediation failure alerts the operator, not the middleware
        assert!(warnings.has_critical_warnings());
        assert_eq!(stats.snapshot().topics["orders"].dead_lettered, 1);
    }
}
