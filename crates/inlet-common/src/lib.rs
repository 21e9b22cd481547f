use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod logging;

// ============================================================================
// Core Message Types
// ============================================================================

/// The message envelope delivered by the pub/sub middleware.
///
/// Uses camelCase field names to match the middleware's JSON wire format.
/// Immutable once received.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessageEnvelope {
    /// Globally unique id of the logical message (stable across redeliveries)
    pub id: String,
    /// Topic the message was published on; selects the handler and pool
    pub topic: String,
    /// Opaque structured payload, interpreted by the topic handler
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl MessageEnvelope {
    pub fn new(id: impl Into<String>, topic: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            topic: topic.into(),
            payload,
        }
    }
}

// ============================================================================
// Configuration Types
// ============================================================================

/// Per-topic configuration, loaded once at startup and immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TopicConfig {
    /// Topic name (unique key)
    pub topic: String,
    /// HTTP route the middleware pushes this topic's deliveries to
    pub route: String,
    /// Maximum concurrent deliveries processed for this topic
    pub concurrency_limit: u32,
    /// Nominal processing latency in milliseconds, used by simulated handlers
    #[serde(default)]
    pub avg_work_ms: u64,
    /// Optional per-topic delivery rate limit
    #[serde(default)]
    pub rate_limit_per_minute: Option<u32>,
    /// Consumer group advertised in the subscription metadata
    #[serde(default)]
    pub consumer_group: Option<String>,
}

impl TopicConfig {
    /// Consumer group name, defaulting to `<topic>-processors`.
    pub fn consumer_group(&self) -> String {
        self.consumer_group
            .clone()
            .unwrap_or_else(|| format!("{}-processors", self.topic))
    }
}

/// Full consumer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerConfig {
    pub topics: Vec<TopicConfig>,
    /// Route the middleware redirects messages to after exhausting its retry budget
    #[serde(default = "default_dead_letter_route")]
    pub dead_letter_route: String,
    /// Capacity of the idempotency set; sized to the middleware's redelivery window
    #[serde(default = "default_idempotency_capacity")]
    pub idempotency_capacity: usize,
}

fn default_dead_letter_route() -> String {
    "/deadletter".to_string()
}

fn default_idempotency_capacity() -> usize {
    100_000
}

// ============================================================================
// Outcome Types
// ============================================================================

/// Classified outcome of a single processing attempt.
///
/// Never persisted beyond the current delivery's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingOutcome {
    /// Handler completed; side effects applied
    Success,
    /// Retry-worthy failure; the middleware should redeliver
    TransientFailure,
    /// Terminal failure; redelivery would never succeed
    PermanentFailure,
}

impl ProcessingOutcome {
    /// Map the outcome to the disposition signalled back to the middleware.
    ///
    /// Permanent failures are acknowledged to stop redelivery of an
    /// unfixable message; the failure itself is logged locally.
    pub fn disposition(self) -> Disposition {
        match self {
            ProcessingOutcome::Success => Disposition::Ack,
            ProcessingOutcome::TransientFailure => Disposition::Retry,
            ProcessingOutcome::PermanentFailure => Disposition::Ack,
        }
    }
}

/// Terminal disposition of a delivery, signalled via the HTTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// 200 - the middleware will not redeliver
    Ack,
    /// 500 - the middleware redelivers per its backoff policy
    Retry,
}

impl Disposition {
    pub fn status_code(self) -> u16 {
        match self {
            Disposition::Ack => 200,
            Disposition::Retry => 500,
        }
    }
}

/// Failure reported by a topic handler for a single attempt.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// Temporary condition (dependency timeout, resource exhaustion)
    #[error("transient: {0}")]
    Transient(String),

    /// Unfixable condition (malformed payload, business-rule violation)
    #[error("permanent: {0}")]
    Permanent(String),

    /// Unclassified error, including caught panics
    #[error("unexpected: {0}")]
    Unexpected(String),
}

// ============================================================================
// Subscription Types
// ============================================================================

/// One entry of the subscription table returned from `GET /subscribe`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionSpec {
    pub topic: String,
    pub route: String,
    pub metadata: SubscriptionMetadata,
}

/// Consumer-group metadata describing the isolation tier of a subscription.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionMetadata {
    pub consumer_group: String,
    pub max_concurrency: u32,
}

// ============================================================================
// Stats Types
// ============================================================================

/// Per-topic processing counters plus derived rates.
///
/// Counters are raw totals; `success_rate` and `avg_processing_ms` are
/// computed at snapshot time and never stored.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TopicStats {
    pub processed: u64,
    pub failed: u64,
    pub active: u64,
    pub duplicates: u64,
    pub rate_limited: u64,
    pub dead_lettered: u64,
    pub success_rate: f64,
    pub avg_processing_ms: f64,
}

/// Aggregate view across all topics.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatsSummary {
    pub total_processed: u64,
    pub total_failed: u64,
    pub total_active: u64,
    pub success_rate_percent: f64,
    pub events_per_minute: f64,
    pub uptime_seconds: u64,
}

/// Point-in-time snapshot of the stats aggregator.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub topics: std::collections::BTreeMap<String, TopicStats>,
    pub summary: StatsSummary,
}

/// Occupancy view of a single topic pool.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TopicPoolStats {
    pub topic: String,
    pub concurrency: u32,
    pub active_workers: u32,
    pub queue_size: u32,
    pub queue_capacity: u32,
    pub rate_limit_per_minute: Option<u32>,
    pub is_rate_limited: bool,
}

// ============================================================================
// Warning System Types
// ============================================================================

/// Warning categories for the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum WarningCategory {
    /// Delivery could not be routed to a topic pool
    Routing,
    /// Message processing failures
    Processing,
    /// Configuration errors (malformed envelopes, bad routes)
    Configuration,
    /// Pool capacity exhausted
    PoolCapacity,
    /// Rate limiting triggered
    RateLimiting,
    /// Dead-letter remediation issues
    DeadLetter,
}

/// Warning severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
pub enum WarningSeverity {
    Info,
    Warn,
    Error,
    Critical,
}

/// An operator-facing warning.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Warning {
    pub id: String,
    pub category: WarningCategory,
    pub severity: WarningSeverity,
    pub message: String,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub acknowledged: bool,
    pub acknowledged_at: Option<DateTime<Utc>>,
}

impl Warning {
    pub fn new(
        category: WarningCategory,
        severity: WarningSeverity,
        message: String,
        source: String,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            category,
            severity,
            message,
            source,
            created_at: Utc::now(),
            acknowledged: false,
            acknowledged_at: None,
        }
    }

    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.created_at).num_minutes()
    }
}

// ============================================================================
// Health Types
// ============================================================================

/// Overall system health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum HealthStatus {
    /// All pools operational
    Healthy,
    /// Some issues detected but operational
    Warning,
    /// Significant issues affecting processing
    Degraded,
}

/// Detailed health report.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: HealthStatus,
    pub pools_total: u32,
    pub pools_saturated: u32,
    pub active_warnings: u32,
    pub critical_warnings: u32,
    pub issues: Vec<String>,
}
