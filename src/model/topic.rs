//! Topic layout for the order/completion exchange.
//!
//! Orders arrive on `{root}/{device}/order` and completions leave on
//! `{root}/{device}/success`. The device id is whatever sits in the second
//! segment of the inbound topic; it is copied verbatim into the outbound one.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_TOPIC_ROOT: &str = "robots";

/// The topic did not carry a usable device id.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Topic '{topic}' has no device segment")]
pub struct InvalidTopic {
    pub topic: String,
}

/// Extracts the device id (segment index 1) from an inbound topic.
pub fn parse_device_id(topic: &str) -> Result<&str, InvalidTopic> {
    match topic.split('/').nth(1) {
        Some(device) if !device.is_empty() => Ok(device),
        _ => Err(InvalidTopic {
            topic: topic.to_string(),
        }),
    }
}

/// Builds the topics and filters for one topic root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicScheme {
    pub root: String,
}

impl TopicScheme {
    pub fn new(root: impl Into<String>) -> Self {
        Self { root: root.into() }
    }

    /// Filter a device subscribes to: `{root}/+/order`.
    pub fn order_filter(&self) -> String {
        format!("{}/+/order", self.root)
    }

    /// Filter a dispatcher subscribes to: `{root}/+/success`.
    pub fn success_filter(&self) -> String {
        format!("{}/+/success", self.root)
    }

    pub fn order_topic(&self, device_id: &str) -> String {
        format!("{}/{}/order", self.root, device_id)
    }

    pub fn success_topic(&self, device_id: &str) -> String {
        format!("{}/{}/success", self.root, device_id)
    }
}

impl Default for TopicScheme {
    fn default() -> Self {
        Self::new(DEFAULT_TOPIC_ROOT)
    }
}
