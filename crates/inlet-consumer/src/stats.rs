//! Stats Aggregator - per-topic processing counters
//!
//! Counters are per-topic atomics in a concurrent map; there is no global
//! lock on the write path. Derived metrics (success rate, throughput) are
//! computed at snapshot time and never stored, so they cannot drift.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;

use inlet_common::{StatsSnapshot, StatsSummary, TopicStats};

#[derive(Default)]
struct TopicCounters {
    processed: AtomicU64,
    failed: AtomicU64,
    active: AtomicU64,
    duplicates: AtomicU64,
    rate_limited: AtomicU64,
    dead_lettered: AtomicU64,
    elapsed_ms_total: AtomicU64,
}

/// Thread-safe per-topic counters, shared by every worker.
pub struct StatsAggregator {
    topics: DashMap<String, Arc<TopicCounters>>,
    started_at: Instant,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self {
            topics: DashMap::new(),
            started_at: Instant::now(),
        }
    }

    /// Pre-register a topic so it appears in snapshots before any traffic.
    pub fn register_topic(&self, topic: &str) {
        self.counters(topic);
    }

    fn counters(&self, topic: &str) -> Arc<TopicCounters> {
        self.topics.entry(topic.to_string()).or_default().clone()
    }

    /// A delivery entered processing.
    pub fn on_start(&self, topic: &str) {
        self.counters(topic).active.fetch_add(1, Ordering::SeqCst);
    }

    /// A delivery completed successfully.
    pub fn on_success(&self, topic: &str, elapsed_ms: u64) {
        let counters = self.counters(topic);
        counters.processed.fetch_add(1, Ordering::SeqCst);
        counters.elapsed_ms_total.fetch_add(elapsed_ms, Ordering::Relaxed);
        counters.active.fetch_sub(1, Ordering::SeqCst);
    }

    /// A delivery failed (transiently or permanently).
    pub fn on_failure(&self, topic: &str, elapsed_ms: u64) {
        let counters = self.counters(topic);
        counters.failed.fetch_add(1, Ordering::SeqCst);
        counters.elapsed_ms_total.fetch_add(elapsed_ms, Ordering::Relaxed);
        counters.active.fetch_sub(1, Ordering::SeqCst);
    }

    /// A delivery short-circuited as a duplicate; `processed` is untouched.
    pub fn on_duplicate(&self, topic: &str) {
        let counters = self.counters(topic);
        counters.duplicates.fetch_add(1, Ordering::SeqCst);
        counters.active.fetch_sub(1, Ordering::SeqCst);
    }

    /// A delivery was rejected by the topic's rate limiter.
    pub fn on_rate_limited(&self, topic: &str) {
        self.counters(topic).rate_limited.fetch_add(1, Ordering::SeqCst);
    }

    /// A dead-lettered message arrived for this topic.
    pub fn on_dead_letter(&self, topic: &str) {
        self.counters(topic).dead_lettered.fetch_add(1, Ordering::SeqCst);
    }

    /// Point-in-time snapshot with derived rates.
    pub fn snapshot(&self) -> StatsSnapshot {
        let mut topics = BTreeMap::new();
        let mut total_processed = 0u64;
        let mut total_failed = 0u64;
        let mut total_active = 0u64;

        for entry in self.topics.iter() {
            let c = entry.value();
            let processed = c.processed.load(Ordering::SeqCst);
            let failed = c.failed.load(Ordering::SeqCst);
            let active = c.active.load(Ordering::SeqCst);
            let attempts = processed + failed;

            total_processed += processed;
            total_failed += failed;
            total_active += active;

            topics.insert(
                entry.key().clone(),
                TopicStats {
                    processed,
                    failed,
                    active,
                    duplicates: c.duplicates.load(Ordering::SeqCst),
                    rate_limited: c.rate_limited.load(Ordering::SeqCst),
                    dead_lettered: c.dead_lettered.load(Ordering::SeqCst),
                    success_rate: processed as f64 / attempts.max(1) as f64,
                    avg_processing_ms: c.elapsed_ms_total.load(Ordering::Relaxed) as f64
                        / attempts.max(1) as f64,
                },
            );
        }

        let uptime = self.started_at.elapsed();
        let attempts = total_processed + total_failed;
        let success_rate_percent =
            (total_processed as f64 / attempts.max(1) as f64 * 10_000.0).round() / 100.0;
        let events_per_minute =
            total_processed as f64 / (uptime.as_secs_f64() / 60.0).max(1.0);

        StatsSnapshot {
            topics,
            summary: StatsSummary {
                total_processed,
                total_failed,
                total_active,
                success_rate_percent,
                events_per_minute,
                uptime_seconds: uptime.as_secs(),
            },
        }
    }

    /// Overall success rate (0.0 - 1.0); 1.0 before any traffic.
    pub fn overall_success_rate(&self) -> f64 {
        let mut processed = 0u64;
        let mut failed = 0u64;
        for entry in self.topics.iter() {
            processed += entry.value().processed.load(Ordering::SeqCst);
            failed += entry.value().failed.load(Ordering::SeqCst);
        }
        if processed + failed == 0 {
            return 1.0;
        }
        processed as f64 / (processed + failed) as f64
    }
}

impl Default for StatsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_topics_appear_with_zeroes() {
        let stats = StatsAggregator::new();
        stats.register_topic("orders");

        let snapshot = stats.snapshot();
        let orders = &snapshot.topics["orders"];
        assert_eq!(orders.processed, 0);
        assert_eq!(orders.failed, 0);
        assert_eq!(orders.active, 0);
    }

    #[test]
    fn counts_and_rates_reflect_terminal_states() {
        let stats = StatsAggregator::new();
        for _ in 0..3 {
            stats.on_start("orders");
            stats.on_success("orders", 10);
        }
        stats.on_start("orders");
        stats.on_failure("orders", 30);

        let snapshot = stats.snapshot();
        let orders = &snapshot.topics["orders"];
        assert_eq!(orders.processed, 3);
        assert_eq!(orders.failed, 1);
        assert_eq!(orders.active, 0);
        assert!((orders.success_rate - 0.75).abs() < f64::EPSILON);
        assert!((orders.avg_processing_ms - 15.0).abs() < f64::EPSILON);
        assert_eq!(snapshot.summary.total_processed, 3);
        assert_eq!(snapshot.summary.total_failed, 1);
        assert!((snapshot.summary.success_rate_percent - 75.0).abs() < f64::EPSILON);
    }

    #[test]
    fn duplicates_do_not_touch_processed() {
        let stats = StatsAggregator::new();
        stats.on_start("orders");
        stats.on_success("orders", 5);
        stats.on_start("orders");
        stats.on_duplicate("orders");

        let snapshot = stats.snapshot();
        let orders = &snapshot.topics["orders"];
        assert_eq!(orders.processed, 1);
        assert_eq!(orders.duplicates, 1);
        assert_eq!(orders.active, 0);
    }

    #[test]
    fn topics_are_isolated() {
        let stats = StatsAggregator::new();
        stats.on_start("orders");
        stats.on_success("orders", 1);
        stats.on_start("users");
        stats.on_failure("users", 1);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.topics["orders"].processed, 1);
        assert_eq!(snapshot.topics["orders"].failed, 0);
        assert_eq!(snapshot.topics["users"].processed, 0);
        assert_eq!(snapshot.topics["users"].failed, 1);
    }
}
