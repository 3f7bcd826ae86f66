use crate::order_handler::{HandlerError, OrderOutcome};
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-outcome counters for a handler.
///
/// These are the only values a handler shares across deliveries; they never
/// influence how an order is processed.
#[derive(Debug, Default)]
pub struct HandlerStats {
    received: AtomicU64,
    completed: AtomicU64,
    duplicates_suppressed: AtomicU64,
    malformed: AtomicU64,
    invalid_topic: AtomicU64,
    publish_failures: AtomicU64,
    cancelled: AtomicU64,
}

/// Point-in-time copy of [`HandlerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub received: u64,
    pub completed: u64,
    pub duplicates_suppressed: u64,
    pub malformed: u64,
    pub invalid_topic: u64,
    pub publish_failures: u64,
    pub cancelled: u64,
}

impl HandlerStats {
    pub(crate) fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record(&self, result: &Result<OrderOutcome, HandlerError>) {
        let counter = match result {
            Ok(OrderOutcome::Completed { .. }) => &self.completed,
            Ok(OrderOutcome::DuplicateSuppressed { .. }) => &self.duplicates_suppressed,
            Err(HandlerError::MalformedOrder { .. }) => &self.malformed,
            Err(HandlerError::InvalidTopic(_)) => &self.invalid_topic,
            Err(HandlerError::PublishFailure { .. }) | Err(HandlerError::Encode(_)) => {
                &self.publish_failures
            }
            Err(HandlerError::Cancelled { .. }) => &self.cancelled,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            duplicates_suppressed: self.duplicates_suppressed.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            invalid_topic: self.invalid_topic.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }
}
