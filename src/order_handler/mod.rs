//! Order handling: decode, simulate work, publish the completion.

pub mod error;
pub mod handler;
pub mod policy;
pub mod simulator;
pub mod stats;

pub use error::*;
pub use handler::*;
pub use policy::*;
pub use simulator::*;
pub use stats::*;

use crate::framework::MessagingSession;
use crate::lifecycle::{DeviceConfig, ShutdownSignal};
use std::sync::Arc;

/// Creates an order handler from device configuration.
///
/// Work is simulated with a [`SleepSimulator`] of `config.work_duration`.
pub fn new(
    session: Arc<dyn MessagingSession>,
    config: &DeviceConfig,
    shutdown: ShutdownSignal,
) -> OrderHandler {
    with_simulator(session, config, Arc::new(SleepSimulator::new(config.work_duration)), shutdown)
}

/// Like [`new`], with a caller-supplied work simulator.
pub fn with_simulator(
    session: Arc<dyn MessagingSession>,
    config: &DeviceConfig,
    simulator: Arc<dyn WorkSimulator>,
    shutdown: ShutdownSignal,
) -> OrderHandler {
    OrderHandler::new(session, simulator)
        .with_topics(config.topics.clone())
        .with_retry(config.publish_retry)
        .with_duplicates(config.duplicates)
        .with_shutdown(shutdown)
}
