//! Error types for the order handler.

use crate::framework::TransportError;
use crate::model::InvalidTopic;
use thiserror::Error;

/// Errors that end the processing of one order message.
///
/// None of these are fatal to the device: the handler logs them and moves on
/// to the next delivery.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum HandlerError {
    /// The payload is not JSON, or has no string `task_token`.
    #[error("Malformed order on '{topic}': {reason}")]
    MalformedOrder { topic: String, reason: String },

    /// The inbound topic has no device segment.
    #[error(transparent)]
    InvalidTopic(#[from] InvalidTopic),

    /// The completion could not be published, even after retries.
    #[error("Completion for '{task_token}' on '{topic}' failed after {attempts} attempt(s): {source}")]
    PublishFailure {
        topic: String,
        task_token: String,
        attempts: u32,
        #[source]
        source: TransportError,
    },

    /// Shutdown began before the completion was published.
    #[error("Shutdown began before order '{task_token}' completed")]
    Cancelled { task_token: String },

    /// The completion payload could not be serialized.
    #[error("Completion encoding error: {0}")]
    Encode(String),
}

impl HandlerError {
    pub(crate) fn malformed(topic: &str, reason: impl ToString) -> Self {
        HandlerError::MalformedOrder {
            topic: topic.to_string(),
            reason: reason.to_string(),
        }
    }
}
