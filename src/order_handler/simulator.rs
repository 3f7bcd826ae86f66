//! Simulated device work.
//!
//! The handler awaits a [`WorkSimulator`] between decoding an order and
//! publishing its completion. Production uses [`SleepSimulator`]; tests swap in
//! [`InstantSimulator`] so they do not pay for real busy time.

use crate::model::Order;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

#[async_trait]
pub trait WorkSimulator: Send + Sync + 'static {
    /// Returns once the work for `order` is done.
    async fn perform(&self, order: &Order);

    /// How long `perform` is expected to take.
    fn nominal_duration(&self) -> Duration {
        Duration::ZERO
    }
}

/// Holds the order for a fixed duration.
#[derive(Debug, Clone, Copy)]
pub struct SleepSimulator {
    duration: Duration,
}

impl SleepSimulator {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

#[async_trait]
impl WorkSimulator for SleepSimulator {
    async fn perform(&self, order: &Order) {
        debug!(duration = ?self.duration, smoothie = ?order.smoothie, "Simulating work");
        tokio::time::sleep(self.duration).await;
    }

    fn nominal_duration(&self) -> Duration {
        self.duration
    }
}

/// Finishes immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstantSimulator;

#[async_trait]
impl WorkSimulator for InstantSimulator {
    async fn perform(&self, _order: &Order) {}
}
