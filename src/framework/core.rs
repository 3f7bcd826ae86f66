//! # Core Messaging Contract
//!
//! This module defines the seam between the device logic and whatever broker
//! connection is carrying its messages.
//!
//! ## Key Types
//!
//! - [`MessagingSession`]: The capability a live broker session exposes (`subscribe` + `publish`).
//! - [`MessageHandler`]: The callback interface a session drives for every delivery.
//! - [`DeliveryGuarantee`]: The QoS attached to subscriptions and publishes.
//! - [`TransportError`]: Errors reported by the session itself.

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;

// =============================================================================
// 1. DELIVERY GUARANTEES & ERRORS
// =============================================================================

/// The transport's promise about message delivery.
///
/// Mirrors MQTT QoS levels. Orders and completions both travel `AtLeastOnce`,
/// which means duplicates are possible and loss is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub enum DeliveryGuarantee {
    /// Fire and forget (QoS 0).
    AtMostOnce,
    /// Delivered one or more times (QoS 1).
    #[default]
    AtLeastOnce,
}

impl DeliveryGuarantee {
    /// The MQTT QoS level this guarantee corresponds to.
    pub fn qos(self) -> u8 {
        match self {
            DeliveryGuarantee::AtMostOnce => 0,
            DeliveryGuarantee::AtLeastOnce => 1,
        }
    }
}

impl PartialOrd for DeliveryGuarantee {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DeliveryGuarantee {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.qos().cmp(&other.qos())
    }
}

impl fmt::Display for DeliveryGuarantee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QoS{}", self.qos())
    }
}

/// Errors reported by a [`MessagingSession`].
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum TransportError {
    /// The session is no longer connected (bootstrap-layer connection loss).
    #[error("Session closed")]
    Closed,
    /// The broker rejected or failed to acknowledge a publish.
    #[error("Publish to '{topic}' failed: {reason}")]
    PublishRejected { topic: String, reason: String },
    /// The broker refused a subscription.
    #[error("Subscribe to '{filter}' failed: {reason}")]
    SubscribeRejected { filter: String, reason: String },
}

// =============================================================================
// 2. THE HANDLER INTERFACE
// =============================================================================

/// One inbound message as delivered by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub topic: String,
    pub payload: Bytes,
}

impl Delivery {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Callback interface registered against a session.
///
/// # Architecture Note
/// Whether two deliveries run concurrently or back to back is a property of the
/// session implementation, not of the handler. Handlers therefore must not rely
/// on either, and must not hold cross-message mutable state they have not
/// synchronised themselves.
///
/// `on_message` returns nothing: a pub/sub delivery cannot be NACKed, so a
/// handler logs its own failures and drops the message.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn on_message(&self, topic: &str, payload: &[u8]);
}

// =============================================================================
// 3. THE SESSION CAPABILITY
// =============================================================================

/// A live, authenticated broker session.
///
/// Establishing the session (endpoint discovery, certificates, client id) happens
/// before anything in this crate runs; once a value implementing this trait
/// exists, `subscribe` and `publish` are safe to call.
#[async_trait]
pub trait MessagingSession: Send + Sync + 'static {
    /// Registers `handler` for every message whose topic matches `filter`.
    async fn subscribe(
        &self,
        filter: &str,
        guarantee: DeliveryGuarantee,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), TransportError>;

    /// Publishes `payload` to `topic`.
    async fn publish(
        &self,
        topic: &str,
        payload: Bytes,
        guarantee: DeliveryGuarantee,
    ) -> Result<(), TransportError>;
}

// =============================================================================
// 4. TOPIC FILTER MATCHING
// =============================================================================

/// Returns true if `topic` matches the MQTT-style `filter`.
///
/// `+` matches exactly one segment and `#` matches the remainder of the topic
/// (including zero segments) when it is the final filter segment.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_parts = filter.split('/');
    let mut topic_parts = topic.split('/');

    loop {
        match (filter_parts.next(), topic_parts.next()) {
            (Some("#"), _) => return filter_parts.next().is_none(),
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}
