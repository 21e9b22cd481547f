//! TopicPool Unit Tests
//!
//! Tests for:
//! - Pool creation and configuration
//! - Concurrent delivery processing
//! - Outcome classification at the pool boundary
//! - Idempotent short-circuiting
//! - Capacity and rate-limit back-pressure
//! - Shutdown behavior

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use inlet_common::{Disposition, HandlerError, MessageEnvelope, TopicConfig};
use inlet_consumer::{IdempotencyTracker, StatsAggregator, TopicHandler, TopicPool};

enum Mode {
    Succeed,
    FailTransient,
    FailPermanent,
    Panic,
}

/// Mock handler that tracks calls and can simulate delays/failures
struct MockHandler {
    call_count: AtomicU32,
    delay_ms: u64,
    mode: Mode,
}

impl MockHandler {
    fn new() -> Self {
        Self {
            call_count: AtomicU32::new(0),
            delay_ms: 0,
            mode: Mode::Succeed,
        }
    }

    fn with_delay(delay_ms: u64) -> Self {
        Self {
            call_count: AtomicU32::new(0),
            delay_ms,
            mode: Mode::Succeed,
        }
    }

    fn with_mode(mode: Mode) -> Self {
        Self {
            call_count: AtomicU32::new(0),
            delay_ms: 0,
            mode,
        }
    }

    fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TopicHandler for MockHandler {
    async fn process(&self, _envelope: &MessageEnvelope) -> Result<(), HandlerError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }

        match self.mode {
            Mode::Succeed => Ok(()),
            Mode::FailTransient => Err(HandlerError::Transient("dependency timeout".to_string())),
            Mode::FailPermanent => Err(HandlerError::Permanent("malformed payload".to_string())),
            Mode::Panic => panic!("handler exploded"),
        }
    }
}

fn topic_config(topic: &str, concurrency: u32) -> TopicConfig {
    TopicConfig {
        topic: topic.to_string(),
        route: format!("/events/{}", topic),
        concurrency_limit: concurrency,
        avg_work_ms: 0,
        rate_limit_per_minute: None,
        consumer_group: None,
    }
}

fn envelope(id: &str, topic: &str) -> MessageEnvelope {
    MessageEnvelope::new(id, topic, json!({"test": true}))
}

fn make_pool(
    config: TopicConfig,
    handler: Arc<MockHandler>,
) -> (TopicPool, Arc<StatsAggregator>, Arc<IdempotencyTracker>) {
    let stats = Arc::new(StatsAggregator::new());
    let idempotency = Arc::new(IdempotencyTracker::new(1000));
    let pool = TopicPool::new(config, handler, stats.clone(), idempotency.clone());
    (pool, stats, idempotency)
}

#[tokio::test]
async fn test_pool_creation() {
    let (pool, _, _) = make_pool(topic_config("orders", 5), Arc::new(MockHandler::new()));

    assert_eq!(pool.topic(), "orders");
    assert_eq!(pool.concurrency(), 5);
    assert_eq!(pool.queue_capacity(), 10);
    assert_eq!(pool.queue_size(), 0);
    assert_eq!(pool.active_workers(), 0);
    assert!(pool.is_fully_drained());
}

#[tokio::test]
async fn test_small_pools_get_minimum_capacity() {
    let (pool, _, _) = make_pool(topic_config("orders", 2), Arc::new(MockHandler::new()));
    assert_eq!(pool.queue_capacity(), 8);
}

#[tokio::test]
async fn test_single_delivery_acked() {
    let handler = Arc::new(MockHandler::new());
    let (pool, stats, _) = make_pool(topic_config("orders", 5), handler.clone());

    let rx = pool.submit(envelope("msg-1", "orders"));
    let disposition = tokio::time::timeout(Duration::from_secs(5), rx)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(disposition, Disposition::Ack);
    assert_eq!(handler.call_count(), 1);

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.topics["orders"].processed, 1);
    assert_eq!(snapshot.topics["orders"].active, 0);
}

#[tokio::test]
async fn test_concurrent_deliveries_all_acked() {
    let handler = Arc::new(MockHandler::with_delay(50));
    let (pool, stats, _) = make_pool(topic_config("orders", 10), handler.clone());

    let mut receivers = Vec::new();
    for i in 0..5 {
        receivers.push(pool.submit(envelope(&format!("msg-{}", i), "orders")));
    }

    for rx in receivers {
        let disposition = tokio::time::timeout(Duration::from_secs(5), rx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(disposition, Disposition::Ack);
    }

    assert_eq!(handler.call_count(), 5);
    assert_eq!(stats.snapshot().topics["orders"].processed, 5);
}

#[tokio::test]
async fn test_transient_failure_requests_redelivery() {
    let handler = Arc::new(MockHandler::with_mode(Mode::FailTransient));
    let (pool, stats, idempotency) = make_pool(topic_config("orders", 5), handler);

    let rx = pool.submit(envelope("msg-1", "orders"));
    let disposition = tokio::time::timeout(Duration::from_secs(5), rx)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(disposition, Disposition::Retry);
    assert_eq!(stats.snapshot().topics["orders"].failed, 1);

    // The claim is released so the redelivery can reprocess
    assert!(!idempotency.contains("msg-1"));
}

#[tokio::test]
async fn test_permanent_failure_is_acked() {
    let handler = Arc::new(MockHandler::with_mode(Mode::FailPermanent));
    let (pool, stats, idempotency) = make_pool(topic_config("orders", 5), handler);

    let rx = pool.submit(envelope("msg-1", "orders"));
    let disposition = tokio::time::timeout(Duration::from_secs(5), rx)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(disposition, Disposition::Ack);
    assert_eq!(stats.snapshot().topics["orders"].failed, 1);
    assert_eq!(stats.snapshot().topics["orders"].processed, 0);

    // Acked messages never come back; the claim stays
    assert!(idempotency.contains("msg-1"));
}

#[tokio::test]
async fn test_duplicate_delivery_short_circuits() {
    let handler = Arc::new(MockHandler::new());
    let (pool, stats, _) = make_pool(topic_config("orders", 5), handler.clone());

    let first = pool.submit(envelope("msg-1", "orders"));
    assert_eq!(first.await.unwrap(), Disposition::Ack);

    let second = pool.submit(envelope("msg-1", "orders"));
    assert_eq!(second.await.unwrap(), Disposition::Ack);

    assert_eq!(handler.call_count(), 1);

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.topics["orders"].processed, 1);
    assert_eq!(snapshot.topics["orders"].duplicates, 1);
    assert_eq!(snapshot.topics["orders"].active, 0);
}

#[tokio::test]
async fn test_handler_panic_treated_as_transient() {
    let handler = Arc::new(MockHandler::with_mode(Mode::Panic));
    let (pool, stats, idempotency) = make_pool(topic_config("orders", 5), handler);

    let rx = pool.submit(envelope("msg-1", "orders"));
    let disposition = tokio::time::timeout(Duration::from_secs(5), rx)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(disposition, Disposition::Retry);
    assert_eq!(stats.snapshot().topics["orders"].failed, 1);
    assert_eq!(stats.snapshot().topics["orders"].active, 0);
    assert!(!idempotency.contains("msg-1"));
}

#[tokio::test]
async fn test_saturated_pool_rejects_with_retry() {
    // concurrency 2 -> capacity 8; with slow work, at most
    // capacity + concurrency deliveries can be admitted before completions
    let handler = Arc::new(MockHandler::with_delay(300));
    let (pool, _, _) = make_pool(topic_config("orders", 2), handler);

    let mut receivers = Vec::new();
    for i in 0..20 {
        receivers.push(pool.submit(envelope(&format!("msg-{}", i), "orders")));
    }

    let mut acks = 0;
    let mut retries = 0;
    for rx in receivers {
        match tokio::time::timeout(Duration::from_secs(10), rx)
            .await
            .unwrap()
            .unwrap()
        {
            Disposition::Ack => acks += 1,
            Disposition::Retry => retries += 1,
        }
    }

    assert!(retries >= 10, "expected back-pressure, got {} retries", retries);
    assert_eq!(acks + retries, 20);
}

#[tokio::test]
async fn test_rate_limit_rejects_with_retry() {
    let mut config = topic_config("audit", 5);
    config.rate_limit_per_minute = Some(2);
    let handler = Arc::new(MockHandler::new());
    let stats = Arc::new(StatsAggregator::new());
    let idempotency = Arc::new(IdempotencyTracker::new(1000));
    let pool = TopicPool::new(config, handler, stats.clone(), idempotency);

    // Quota of 2/minute admits a burst of two, then rejects
    let first = pool.submit(envelope("msg-1", "audit"));
    let second = pool.submit(envelope("msg-2", "audit"));
    let third = pool.submit(envelope("msg-3", "audit"));

    assert_eq!(first.await.unwrap(), Disposition::Ack);
    assert_eq!(second.await.unwrap(), Disposition::Ack);
    assert_eq!(third.await.unwrap(), Disposition::Retry);

    assert_eq!(stats.snapshot().topics["audit"].rate_limited, 1);
}

#[tokio::test]
async fn test_drained_pool_rejects() {
    let handler = Arc::new(MockHandler::new());
    let (pool, _, _) = make_pool(topic_config("orders", 5), handler.clone());

    pool.drain();

    let rx = pool.submit(envelope("msg-1", "orders"));
    assert_eq!(rx.await.unwrap(), Disposition::Retry);
    assert_eq!(handler.call_count(), 0);
}
