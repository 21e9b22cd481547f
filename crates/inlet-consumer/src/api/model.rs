//! API request/response models

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use inlet_common::{HealthReport, StatsSummary, TopicPoolStats};

/// Simple health response for the basic health check.
#[derive(Serialize, ToSchema)]
pub struct SimpleHealthResponse {
    /// Health status: UP, DEGRADED
    pub status: String,
    /// Application version
    pub version: String,
    /// Seconds since the server started
    pub uptime_seconds: u64,
}

/// Kubernetes probe response.
#[derive(Serialize, ToSchema)]
pub struct ProbeResponse {
    /// Probe status: LIVE, READY, NOT_READY
    pub status: String,
}

/// Detailed monitoring response.
#[derive(Serialize, ToSchema)]
pub struct MonitoringResponse {
    /// Overall status: HEALTHY, WARNING, DEGRADED
    pub status: String,
    /// Application version
    pub version: String,
    /// Detailed health report
    pub health_report: HealthReport,
    /// Per-topic pool occupancy
    pub pool_stats: Vec<TopicPoolStats>,
    /// Aggregate processing totals
    pub stats: StatsSummary,
    /// Number of unacknowledged warnings
    pub active_warnings: u32,
    /// Number of critical warnings
    pub critical_warnings: u32,
}

/// Query params for the warnings endpoint.
#[derive(Deserialize, Default, ToSchema)]
pub struct WarningsQuery {
    /// Filter by severity: INFO, WARN, ERROR, CRITICAL
    pub severity: Option<String>,
    /// Filter by acknowledged status
    pub acknowledged: Option<bool>,
}

/// Response after acknowledging a warning.
#[derive(Serialize, ToSchema)]
pub struct AcknowledgeResponse {
    pub acknowledged: bool,
}
