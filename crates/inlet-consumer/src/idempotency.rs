//! Idempotency Tracker - at-most-once side effects under at-least-once delivery
//!
//! Records which message ids have been fully processed. The claim is taken
//! atomically before processing starts, so among concurrent deliveries of
//! the same id exactly one observes `NewlyMarked`; a transient failure
//! releases the claim so the middleware's redelivery can reprocess.

use std::collections::VecDeque;

use dashmap::DashSet;
use parking_lot::Mutex;
use tracing::debug;

/// Default capacity, sized for a generous middleware redelivery window.
pub const DEFAULT_CAPACITY: usize = 100_000;

/// Result of an atomic check-and-mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdempotencyStatus {
    /// This caller claimed the id; it must run the handler
    NewlyMarked,
    /// The id was already claimed; short-circuit to success
    AlreadyProcessed,
}

/// Bounded in-memory set of processed message ids.
///
/// Membership is evicted oldest-inserted-first once `capacity` is exceeded,
/// so the set cannot grow without bound in a long-running service. An id
/// that was unmarked after a transient failure may leave a stale order
/// entry behind; if the id is later re-marked, eviction can retire it
/// early, which only shortens that id's dedup window.
pub struct IdempotencyTracker {
    seen: DashSet<String>,
    insertion_order: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl IdempotencyTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            seen: DashSet::new(),
            insertion_order: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
            capacity: capacity.max(1),
        }
    }

    /// Atomically claim `id`.
    ///
    /// Exactly one caller among concurrent callers for the same id observes
    /// `NewlyMarked`; all others observe `AlreadyProcessed`.
    pub fn check_and_mark(&self, id: &str) -> IdempotencyStatus {
        if !self.seen.insert(id.to_string()) {
            return IdempotencyStatus::AlreadyProcessed;
        }

        let mut order = self.insertion_order.lock();
        order.push_back(id.to_string());
        while order.len() > self.capacity {
            if let Some(oldest) = order.pop_front() {
                if self.seen.remove(&oldest).is_some() {
                    debug!(message_id = %oldest, "evicted oldest idempotency record");
                }
            }
        }

        IdempotencyStatus::NewlyMarked
    }

    /// Release a claim so a redelivery can reprocess.
    ///
    /// Called when the attempt classified as a transient failure; permanent
    /// failures keep the claim since the message is acked and never returns.
    pub fn unmark(&self, id: &str) {
        self.seen.remove(id);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl Default for IdempotencyTracker {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
