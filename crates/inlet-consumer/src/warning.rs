//! Warning Service - in-memory operator alert channel
//!
//! Failures that must reach an operator but never the middleware (permanent
//! failures, dead-letter remediation errors, pool capacity issues) land
//! here, with category and severity, bounded in size and age.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::debug;

use inlet_common::{Warning, WarningCategory, WarningSeverity};

/// Configuration for the warning service.
#[derive(Debug, Clone)]
pub struct WarningServiceConfig {
    /// Maximum age of warnings in hours before cleanup
    pub max_warning_age_hours: i64,
    /// Maximum number of warnings to keep
    pub max_warnings: usize,
}

impl Default for WarningServiceConfig {
    fn default() -> Self {
        Self {
            max_warning_age_hours: 24,
            max_warnings: 1000,
        }
    }
}

/// In-memory warning store.
pub struct WarningService {
    warnings: RwLock<HashMap<String, Warning>>,
    config: WarningServiceConfig,
}

impl WarningService {
    pub fn new(config: WarningServiceConfig) -> Self {
        Self {
            warnings: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Add a new warning, returning its id.
    pub fn add_warning(
        &self,
        category: WarningCategory,
        severity: WarningSeverity,
        message: String,
        source: String,
    ) -> String {
        let warning = Warning::new(category, severity, message, source);
        let id = warning.id.clone();

        let mut warnings = self.warnings.write();
        if warnings.len() >= self.config.max_warnings {
            Self::evict_oldest(&mut warnings);
        }

        debug!(
            id = %id,
            category = ?category,
            severity = ?severity,
            "Added warning"
        );
        warnings.insert(id.clone(), warning);
        id
    }

    pub fn get_all_warnings(&self) -> Vec<Warning> {
        self.warnings.read().values().cloned().collect()
    }

    pub fn get_unacknowledged_warnings(&self) -> Vec<Warning> {
        self.warnings
            .read()
            .values()
            .filter(|w| !w.acknowledged)
            .cloned()
            .collect()
    }

    pub fn get_warnings_by_severity(&self, severity: WarningSeverity) -> Vec<Warning> {
        self.warnings
            .read()
            .values()
            .filter(|w| w.severity == severity)
            .cloned()
            .collect()
    }

    /// Acknowledge a warning; returns false if the id is unknown.
    pub fn acknowledge_warning(&self, id: &str) -> bool {
        let mut warnings = self.warnings.write();
        if let Some(warning) = warnings.get_mut(id) {
            warning.acknowledged = true;
            warning.acknowledged_at = Some(Utc::now());
            debug!(id = %id, "Warning acknowledged");
            true
        } else {
            false
        }
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.read().len()
    }

    pub fn unacknowledged_count(&self) -> usize {
        self.warnings
            .read()
            .values()
            .filter(|w| !w.acknowledged)
            .count()
    }

    pub fn critical_count(&self) -> usize {
        self.warnings
            .read()
            .values()
            .filter(|w| w.severity == WarningSeverity::Critical && !w.acknowledged)
            .count()
    }

    pub fn has_critical_warnings(&self) -> bool {
        self.critical_count() > 0
    }

    /// Drop warnings older than the configured maximum age.
    pub fn clear_old_warnings(&self) -> usize {
        let mut warnings = self.warnings.write();
        let threshold_minutes = self.config.max_warning_age_hours * 60;
        let before = warnings.len();
        warnings.retain(|_, w| w.age_minutes() <= threshold_minutes);
        before - warnings.len()
    }

    /// Remove the oldest 10% when at capacity.
    fn evict_oldest(warnings: &mut HashMap<String, Warning>) {
        let to_remove = (warnings.len() / 10).max(1);

        let mut sorted: Vec<_> = warnings
            .iter()
            .map(|(id, w)| (id.clone(), w.created_at))
            .collect();
        sorted.sort_by_key(|(_, created_at)| *created_at);

        for (id, _) in sorted.into_iter().take(to_remove) {
            warnings.remove(&id);
        }
    }
}

impl Default for WarningService {
    fn default() -> Self {
        Self::new(WarningServiceConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_list() {
        let service = WarningService::default();
        let id = service.add_warning(
            WarningCategory::Processing,
            WarningSeverity::Error,
            "permanent failure".to_string(),
            "test".to_string(),
        );

        let warnings = service.get_all_warnings();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].id, id);
    }

    #[test]
    fn acknowledge_clears_unacknowledged_count() {
        let service = WarningService::default();
        let id = service.add_warning(
            WarningCategory::DeadLetter,
            WarningSeverity::Critical,
            "remediation failed".to_string(),
            "test".to_string(),
        );

        assert_eq!(service.unacknowledged_count(), 1);
        assert!(service.has_critical_warnings());

        assert!(service.acknowledge_warning(&id));
        assert_eq!(service.unacknowledged_count(), 0);
        assert!(!service.has_critical_warnings());
    }

    #[test]
    fn acknowledge_unknown_id_is_false() {
        let service = WarningService::default();
        assert!(!service.acknowledge_warning("nope"));
    }

    #[test]
    fn capacity_evicts_oldest() {
        let service = WarningService::new(WarningServiceConfig {
            max_warnings: 10,
            ..WarningServiceConfig::default()
        });

        for i in 0..15 {
            service.add_warning(
                WarningCategory::PoolCapacity,
                WarningSeverity::Warn,
                format!("warning {}", i),
                "test".to_string(),
            );
        }

        assert!(service.warning_count() <= 10);
    }
}
