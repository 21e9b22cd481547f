//! Health Service - overall status derived from pool occupancy and warnings
//!
//! Reads only atomic snapshots; never takes a dispatcher or pool lock, so
//! probes stay responsive while pools are saturated.

use std::sync::Arc;

use inlet_common::{HealthReport, HealthStatus, StatsSnapshot, TopicPoolStats};

use crate::warning::WarningService;

/// Configuration for health evaluation.
#[derive(Debug, Clone)]
pub struct HealthServiceConfig {
    /// Success rate at or above which the system is healthy (0.0 - 1.0)
    pub healthy_threshold: f64,
    /// Success rate below which the system is degraded (0.0 - 1.0)
    pub warning_threshold: f64,
}

impl Default for HealthServiceConfig {
    fn default() -> Self {
        Self {
            healthy_threshold: 0.90,
            warning_threshold: 0.70,
        }
    }
}

pub struct HealthService {
    config: HealthServiceConfig,
    warning_service: Arc<WarningService>,
}

impl HealthService {
    pub fn new(config: HealthServiceConfig, warning_service: Arc<WarningService>) -> Self {
        Self {
            config,
            warning_service,
        }
    }

    /// Evaluate overall health from pool occupancy and processing totals.
    pub fn report(&self, pool_stats: &[TopicPoolStats], snapshot: &StatsSnapshot) -> HealthReport {
        let mut issues = Vec::new();

        let mut saturated = 0u32;
        for pool in pool_stats {
            if pool.queue_size >= pool.queue_capacity {
                saturated += 1;
                issues.push(format!(
                    "pool [{}] is saturated ({}/{})",
                    pool.topic, pool.queue_size, pool.queue_capacity
                ));
            }
        }

        let attempts = snapshot.summary.total_processed + snapshot.summary.total_failed;
        let success_rate = if attempts == 0 {
            1.0
        } else {
            snapshot.summary.total_processed as f64 / attempts as f64
        };

        let critical_warnings = self.warning_service.critical_count() as u32;
        let active_warnings = self.warning_service.unacknowledged_count() as u32;

        if critical_warnings > 0 {
            issues.push(format!("{} critical warnings", critical_warnings));
        }
        if success_rate < self.config.healthy_threshold {
            issues.push(format!("success rate {:.1}%", success_rate * 100.0));
        }

        let status = if critical_warnings > 0 || success_rate < self.config.warning_threshold {
            HealthStatus::Degraded
        } else if saturated > 0 || success_rate < self.config.healthy_threshold {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        };

        HealthReport {
            status,
            pools_total: pool_stats.len() as u32,
            pools_saturated: saturated,
            active_warnings,
            critical_warnings,
            issues,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::StatsAggregator;
    use inlet_common::{WarningCategory, WarningSeverity};

    fn pool(topic: &str, queue_size: u32, capacity: u32) -> TopicPoolStats {
        TopicPoolStats {
            topic: topic.to_string(),
            concurrency: 4,
            active_workers: 0,
            queue_size,
            queue_capacity: capacity,
            rate_limit_per_minute: None,
            is_rate_limited: false,
        }
    }

    #[test]
    fn healthy_with_no_traffic() {
        let warnings = Arc::new(WarningService::default());
        let health = HealthService::new(HealthServiceConfig::default(), warnings);
        let stats = StatsAggregator::new();

        let report = health.report(&[pool("orders", 0, 8)], &stats.snapshot());
        assert_eq!(report.status, HealthStatus::Healthy);
        assert_eq!(report.pools_saturated, 0);
    }

    #[test]
    fn saturated_pool_is_a_warning() {
        let warnings = Arc::new(WarningService::default());
        let health = HealthService::new(HealthServiceConfig::default(), warnings);
        let stats = StatsAggregator::new();

        let report = health.report(&[pool("orders", 8, 8)], &stats.snapshot());
        assert_eq!(report.status, HealthStatus::Warning);
        assert_eq!(report.pools_saturated, 1);
        assert!(!report.issues.is_empty());
    }

    #[test]
    fn critical_warning_degrades() {
        let warnings = Arc::new(WarningService::default());
        warnings.add_warning(
            WarningCategory::DeadLetter,
            WarningSeverity::Critical,
            "remediation failed".to_string(),
            "test".to_string(),
        );
        let health = HealthService::new(HealthServiceConfig::default(), warnings);
        let stats = StatsAggregator::new();

        let report = health.report(&[], &stats.snapshot());
        assert_eq!(report.status, HealthStatus::Degraded);
        assert_eq!(report.critical_warnings, 1);
    }

    #[test]
    fn low_success_rate_degrades() {
        let warnings = Arc::new(WarningService::default());
        let health = HealthService::new(HealthServiceConfig::default(), warnings);
        let stats = StatsAggregator::new();
        for _ in 0..3 {
            stats.on_start("orders");
            stats.on_failure("orders", 1);
        }
        stats.on_start("orders");
        stats.on_success("orders", 1);

        let report = health.report(&[], &stats.snapshot());
        assert_eq!(report.status, HealthStatus::Degraded);
    }
}
