//! Error types for the dispatcher.

use crate::framework::TransportError;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum DispatchError {
    /// No robot in the fleet is `ONLINE`.
    #[error("No available robot")]
    NoAvailableRobot,

    /// The robot name cannot be used as a topic segment.
    #[error("Invalid robot name: '{0}'")]
    InvalidRobot(String),

    /// The order could not be published, or the completion subscription failed.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The order payload could not be serialized.
    #[error("Order encoding error: {0}")]
    Encode(String),

    /// No completion arrived within the timeout.
    #[error("Timed out waiting for robot '{robot}' to complete '{task_token}'")]
    Timeout { robot: String, task_token: String },

    /// The dispatcher was dropped while the order was pending.
    #[error("Dispatcher dropped pending order '{0}'")]
    Abandoned(String),
}
