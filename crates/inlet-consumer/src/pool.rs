//! TopicPool - per-topic bounded worker pool
//!
//! Each configured topic gets its own pool with an independent concurrency
//! ceiling. Pools share no queue, no lock, and no capacity, so saturation
//! of one topic cannot delay another. Admission is bounded: deliveries past
//! the pool's queue capacity (and deliveries over the optional rate limit)
//! are rejected with a retry disposition, turning saturation into
//! back-pressure on the middleware rather than unbounded queuing.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use tokio::sync::{oneshot, Semaphore};
use tracing::{debug, error, info, warn};

use inlet_common::{
    Disposition, HandlerError, MessageEnvelope, ProcessingOutcome, TopicConfig, TopicPoolStats,
    WarningCategory, WarningSeverity,
};

use crate::decision::classify;
use crate::handler::TopicHandler;
use crate::idempotency::{IdempotencyStatus, IdempotencyTracker};
use crate::stats::StatsAggregator;
use crate::warning::WarningService;

const QUEUE_CAPACITY_MULTIPLIER: u32 = 2;
const MIN_QUEUE_CAPACITY: u32 = 8;

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Worker pool dedicated to a single topic.
pub struct TopicPool {
    config: TopicConfig,
    handler: Arc<dyn TopicHandler>,
    stats: Arc<StatsAggregator>,
    idempotency: Arc<IdempotencyTracker>,
    warning_service: Option<Arc<WarningService>>,

    /// Pool-level concurrency semaphore
    semaphore: Arc<Semaphore>,

    /// Deliveries admitted but not yet holding a permit
    queue_size: Arc<AtomicU32>,

    /// Deliveries currently holding a permit
    active_workers: Arc<AtomicU32>,

    /// Rate limiter (optional)
    rate_limiter: Option<Arc<DirectRateLimiter>>,

    /// Running state
    running: AtomicBool,
}

impl TopicPool {
    pub fn new(
        config: TopicConfig,
        handler: Arc<dyn TopicHandler>,
        stats: Arc<StatsAggregator>,
        idempotency: Arc<IdempotencyTracker>,
    ) -> Self {
        let rate_limiter = config.rate_limit_per_minute.and_then(|rpm| {
            NonZeroU32::new(rpm).map(|nz| Arc::new(RateLimiter::direct(Quota::per_minute(nz))))
        });

        info!(
            topic = %config.topic,
            concurrency = config.concurrency_limit,
            rate_limit = ?config.rate_limit_per_minute,
            "Starting topic pool"
        );

        Self {
            semaphore: Arc::new(Semaphore::new(config.concurrency_limit as usize)),
            queue_size: Arc::new(AtomicU32::new(0)),
            active_workers: Arc::new(AtomicU32::new(0)),
            rate_limiter,
            running: AtomicBool::new(true),
            config,
            handler,
            stats,
            idempotency,
            warning_service: None,
        }
    }

    /// Set the warning service for operator-facing alerts.
    pub fn with_warning_service(mut self, warning_service: Arc<WarningService>) -> Self {
        self.warning_service = Some(warning_service);
        self
    }

    /// Submit a delivery to the pool.
    ///
    /// Returns the receiver the caller awaits for the terminal disposition.
    /// Rejections (shutdown, saturation, rate limit) resolve immediately
    /// with `Disposition::Retry`.
    pub fn submit(&self, envelope: MessageEnvelope) -> oneshot::Receiver<Disposition> {
        let (ack_tx, ack_rx) = oneshot::channel();

        if !self.running.load(Ordering::SeqCst) {
            let _ = ack_tx.send(Disposition::Retry);
            return ack_rx;
        }

        // Admission bound: the waiting set is capped, not the middleware's
        // patience
        let capacity = self.queue_capacity();
        if self.queue_size.load(Ordering::SeqCst) >= capacity {
            debug!(
                topic = %self.config.topic,
                message_id = %envelope.id,
                capacity = capacity,
                "Pool at capacity, requesting redelivery"
            );
            if let Some(ref ws) = self.warning_service {
                ws.add_warning(
                    WarningCategory::PoolCapacity,
                    WarningSeverity::Warn,
                    format!(
                        "Pool for topic [{}] at capacity ({}) - delivery deferred to middleware",
                        self.config.topic, capacity
                    ),
                    format!("TopicPool:{}", self.config.topic),
                );
            }
            let _ = ack_tx.send(Disposition::Retry);
            return ack_rx;
        }

        // Rate limit is back-pressure, never a blocking wait: the push
        // caller is holding an open request
        if let Some(ref limiter) = self.rate_limiter {
            if limiter.check().is_err() {
                debug!(
                    topic = %self.config.topic,
                    message_id = %envelope.id,
                    "Rate limit exceeded, requesting redelivery"
                );
                self.stats.on_rate_limited(&self.config.topic);
                let _ = ack_tx.send(Disposition::Retry);
                return ack_rx;
            }
        }

        self.queue_size.fetch_add(1, Ordering::SeqCst);

        let topic: Arc<str> = Arc::from(self.config.topic.as_str());
        let handler = self.handler.clone();
        let stats = self.stats.clone();
        let idempotency = self.idempotency.clone();
        let warning_service = self.warning_service.clone();
        let semaphore = self.semaphore.clone();
        let queue_size = self.queue_size.clone();
        let active_workers = self.active_workers.clone();

        tokio::spawn(async move {
            Self::run_delivery(
                topic,
                envelope,
                handler,
                stats,
                idempotency,
                warning_service,
                semaphore,
                queue_size,
                active_workers,
                ack_tx,
            )
            .await;
        });

        ack_rx
    }

    /// Worker body for a single delivery.
    #[allow(clippy::too_many_arguments)]
    async fn run_delivery(
        topic: Arc<str>,
        envelope: MessageEnvelope,
        handler: Arc<dyn TopicHandler>,
        stats: Arc<StatsAggregator>,
        idempotency: Arc<IdempotencyTracker>,
        warning_service: Option<Arc<WarningService>>,
        semaphore: Arc<Semaphore>,
        queue_size: Arc<AtomicU32>,
        active_workers: Arc<AtomicU32>,
        ack_tx: oneshot::Sender<Disposition>,
    ) {
        let permit = match semaphore.acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                error!(topic = %topic, "Semaphore closed");
                queue_size.fetch_sub(1, Ordering::SeqCst);
                let _ = ack_tx.send(Disposition::Retry);
                return;
            }
        };

        queue_size.fetch_sub(1, Ordering::SeqCst);
        active_workers.fetch_add(1, Ordering::SeqCst);
        stats.on_start(&topic);

        let disposition = match idempotency.check_and_mark(&envelope.id) {
            IdempotencyStatus::AlreadyProcessed => {
                info!(
                    message_id = %envelope.id,
                    topic = %topic,
                    "Duplicate delivery, side effects already applied"
                );
                stats.on_duplicate(&topic);
                Disposition::Ack
            }
            IdempotencyStatus::NewlyMarked => {
                let start = Instant::now();

                // Panics are caught here so one bad message cannot take a
                // worker or the process down
                let result = AssertUnwindSafe(handler.process(&envelope))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| {
                        Err(HandlerError::Unexpected(panic_description(panic)))
                    });

                let elapsed_ms = start.elapsed().as_millis() as u64;
                let outcome = Self::record_outcome(
                    &topic,
                    &envelope,
                    result,
                    elapsed_ms,
                    &stats,
                    &idempotency,
                    warning_service.as_ref(),
                );
                outcome.disposition()
            }
        };

        let _ = ack_tx.send(disposition);
        active_workers.fetch_sub(1, Ordering::SeqCst);
        drop(permit);
    }

    /// Classify the attempt, log it, and record the terminal state.
    fn record_outcome(
        topic: &str,
        envelope: &MessageEnvelope,
        result: Result<(), HandlerError>,
        elapsed_ms: u64,
        stats: &StatsAggregator,
        idempotency: &IdempotencyTracker,
        warning_service: Option<&Arc<WarningService>>,
    ) -> ProcessingOutcome {
        match &result {
            Ok(()) => {}
            Err(HandlerError::Transient(reason)) => {
                warn!(
                    message_id = %envelope.id,
                    topic = %topic,
                    reason = %reason,
                    "Transient failure, requesting redelivery"
                );
            }
            Err(HandlerError::Permanent(reason)) => {
                error!(
                    message_id = %envelope.id,
                    topic = %topic,
                    payload = %envelope.payload,
                    reason = %reason,
                    "Permanent failure, acknowledging to stop redelivery"
                );
            }
            Err(HandlerError::Unexpected(reason)) => {
                warn!(
                    message_id = %envelope.id,
                    topic = %topic,
                    reason = %reason,
                    "Unclassified handler error, treating as transient"
                );
            }
        }

        let outcome = classify(result);
        match outcome {
            ProcessingOutcome::Success => {
                debug!(
                    message_id = %envelope.id,
                    topic = %topic,
                    duration_ms = elapsed_ms,
                    "Message processed successfully"
                );
                stats.on_success(topic, elapsed_ms);
            }
            ProcessingOutcome::TransientFailure => {
                // Release the claim so the redelivery reprocesses
                idempotency.unmark(&envelope.id);
                stats.on_failure(topic, elapsed_ms);
            }
            ProcessingOutcome::PermanentFailure => {
                stats.on_failure(topic, elapsed_ms);
                if let Some(ws) = warning_service {
                    ws.add_warning(
                        WarningCategory::Processing,
                        WarningSeverity::Error,
                        format!(
                            "Permanent failure for message [{}] on topic [{}]",
                            envelope.id, topic
                        ),
                        format!("TopicPool:{}", topic),
                    );
                }
            }
        }
        outcome
    }

    pub fn queue_capacity(&self) -> u32 {
        std::cmp::max(
            self.config.concurrency_limit * QUEUE_CAPACITY_MULTIPLIER,
            MIN_QUEUE_CAPACITY,
        )
    }

    pub fn topic(&self) -> &str {
        &self.config.topic
    }

    pub fn concurrency(&self) -> u32 {
        self.config.concurrency_limit
    }

    pub fn queue_size(&self) -> u32 {
        self.queue_size.load(Ordering::SeqCst)
    }

    pub fn active_workers(&self) -> u32 {
        self.active_workers.load(Ordering::SeqCst)
    }

    pub fn is_rate_limited(&self) -> bool {
        self.rate_limiter
            .as_ref()
            .map(|rl| rl.check().is_err())
            .unwrap_or(false)
    }

    /// Occupancy view for monitoring.
    pub fn get_stats(&self) -> TopicPoolStats {
        TopicPoolStats {
            topic: self.config.topic.clone(),
            concurrency: self.config.concurrency_limit,
            active_workers: self.active_workers(),
            queue_size: self.queue_size(),
            queue_capacity: self.queue_capacity(),
            rate_limit_per_minute: self.config.rate_limit_per_minute,
            is_rate_limited: self.is_rate_limited(),
        }
    }

    /// Stop accepting new deliveries; in-flight work runs to completion.
    pub fn drain(&self) {
        info!(topic = %self.config.topic, "Draining topic pool");
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_fully_drained(&self) -> bool {
        self.queue_size() == 0 && self.active_workers() == 0
    }

    pub fn shutdown(&self) {
        info!(topic = %self.config.topic, "Shutting down topic pool");
        self.running.store(false, Ordering::SeqCst);
    }
}

fn panic_description(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {}", message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("handler panicked: {}", message)
    } else {
        "handler panicked".to_string()
    }
}
