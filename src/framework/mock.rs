//! # Mock Session
//!
//! Utilities for testing handlers without a broker.
//!
//! [`RecordingSession`] implements [`MessagingSession`] entirely in memory: it
//! remembers every subscription, records every publish, and lets a test push
//! deliveries straight into the registered handlers with
//! [`RecordingSession::deliver`].
//!
//! Expectations are optional. Without any, every publish succeeds. With
//! [`RecordingSession::expect_publish`] queued, each publish is checked against
//! the next expectation and answered with the outcome the test chose, which is
//! how publish failures are injected.
//!
//! ```ignore
//! let session = Arc::new(RecordingSession::new());
//! session.expect_publish("robots/arm-7/success").return_err(TransportError::Closed);
//! session.expect_publish("robots/arm-7/success").return_ok();
//!
//! // ... drive the handler ...
//!
//! session.verify(); // all expectations consumed, none mismatched
//! ```

use crate::framework::{
    topic_matches, DeliveryGuarantee, MessageHandler, MessagingSession, TransportError,
};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::time::Instant;

// =============================================================================
// RECORDED TRAFFIC
// =============================================================================

/// A publish observed by the mock, successful or not.
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Bytes,
    pub guarantee: DeliveryGuarantee,
    pub at: Instant,
    pub accepted: bool,
}

impl PublishedMessage {
    /// Decodes the payload as JSON, or `Value::Null` if it is not JSON.
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.payload).unwrap_or(serde_json::Value::Null)
    }
}

struct RecordedSubscription {
    filter: String,
    guarantee: DeliveryGuarantee,
    handler: Arc<dyn MessageHandler>,
}

// =============================================================================
// EXPECTATION BUILDER API
// =============================================================================

struct Expectation {
    topic: String,
    payload: Option<serde_json::Value>,
    response: Result<(), TransportError>,
}

/// A recording [`MessagingSession`] with optional expectations.
#[derive(Default)]
pub struct RecordingSession {
    published: Mutex<Vec<PublishedMessage>>,
    subscriptions: Mutex<Vec<RecordedSubscription>>,
    expectations: Arc<Mutex<VecDeque<Expectation>>>,
    mismatches: Mutex<Vec<String>>,
}

impl RecordingSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expects the next publish to go to `topic`.
    pub fn expect_publish(&self, topic: impl Into<String>) -> PublishExpectationBuilder {
        PublishExpectationBuilder {
            topic: topic.into(),
            payload: None,
            expectations: self.expectations.clone(),
        }
    }

    /// All publishes seen so far, in order, including rejected ones.
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().clone()
    }

    /// Accepted publishes to exactly `topic`.
    pub fn published_to(&self, topic: &str) -> Vec<PublishedMessage> {
        self.published
            .lock()
            .iter()
            .filter(|m| m.accepted && m.topic == topic)
            .cloned()
            .collect()
    }

    /// Filters that handlers have subscribed to.
    pub fn subscriptions(&self) -> Vec<(String, DeliveryGuarantee)> {
        self.subscriptions
            .lock()
            .iter()
            .map(|s| (s.filter.clone(), s.guarantee))
            .collect()
    }

    /// Delivers a message to every handler whose filter matches `topic`, awaiting each.
    ///
    /// Returns the number of handlers invoked.
    pub async fn deliver(&self, topic: &str, payload: impl AsRef<[u8]>) -> usize {
        let handlers: Vec<_> = self
            .subscriptions
            .lock()
            .iter()
            .filter(|s| topic_matches(&s.filter, topic))
            .map(|s| s.handler.clone())
            .collect();

        for handler in &handlers {
            handler.on_message(topic, payload.as_ref()).await;
        }
        handlers.len()
    }

    /// Verifies that all expectations were met.
    pub fn verify(&self) {
        let mismatches = self.mismatches.lock();
        if !mismatches.is_empty() {
            panic!("Unexpected publishes: {:?}", *mismatches);
        }
        let exps = self.expectations.lock();
        if !exps.is_empty() {
            panic!("Not all expectations were met. {} remaining", exps.len());
        }
    }
}

#[async_trait]
impl MessagingSession for RecordingSession {
    async fn subscribe(
        &self,
        filter: &str,
        guarantee: DeliveryGuarantee,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), TransportError> {
        self.subscriptions.lock().push(RecordedSubscription {
            filter: filter.to_string(),
            guarantee,
            handler,
        });
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Bytes,
        guarantee: DeliveryGuarantee,
    ) -> Result<(), TransportError> {
        let expectation = self.expectations.lock().pop_front();

        let response = match expectation {
            None => Ok(()),
            Some(exp) => {
                if exp.topic != topic {
                    self.mismatches
                        .lock()
                        .push(format!("expected topic '{}', got '{}'", exp.topic, topic));
                }
                if let Some(expected) = &exp.payload {
                    let actual: serde_json::Value =
                        serde_json::from_slice(&payload).unwrap_or(serde_json::Value::Null);
                    if &actual != expected {
                        self.mismatches
                            .lock()
                            .push(format!("expected payload {expected}, got {actual}"));
                    }
                }
                exp.response
            }
        };

        self.published.lock().push(PublishedMessage {
            topic: topic.to_string(),
            payload,
            guarantee,
            at: Instant::now(),
            accepted: response.is_ok(),
        });
        response
    }
}

/// Builder for `publish` expectations.
pub struct PublishExpectationBuilder {
    topic: String,
    payload: Option<serde_json::Value>,
    expectations: Arc<Mutex<VecDeque<Expectation>>>,
}

impl PublishExpectationBuilder {
    /// Also require the payload to equal `payload` as JSON.
    pub fn with_json(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Sets the expectation to accept the publish.
    pub fn return_ok(self) {
        self.expectations.lock().push_back(Expectation {
            topic: self.topic,
            payload: self.payload,
            response: Ok(()),
        });
    }

    /// Sets the expectation to fail the publish with `error`.
    pub fn return_err(self, error: TransportError) {
        self.expectations.lock().push_back(Expectation {
            topic: self.topic,
            payload: self.payload,
            response: Err(error),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Counter(Mutex<Vec<String>>);

    #[async_trait]
    impl MessageHandler for Counter {
        async fn on_message(&self, topic: &str, _payload: &[u8]) {
            self.0.lock().push(topic.to_string());
        }
    }

    #[tokio::test]
    async fn test_mock_session_records_and_delivers() {
        let session = RecordingSession::new();
        let handler = Arc::new(Counter(Mutex::new(Vec::new())));
        session
            .subscribe("robots/+/order", DeliveryGuarantee::AtLeastOnce, handler.clone())
            .await
            .unwrap();

        assert_eq!(session.deliver("robots/a/order", b"{}").await, 1);
        assert_eq!(session.deliver("robots/a/success", b"{}").await, 0);
        assert_eq!(*handler.0.lock(), vec!["robots/a/order".to_string()]);

        session
            .publish("robots/a/success", Bytes::from_static(b"{\"TaskToken\":\"t\"}"), DeliveryGuarantee::AtLeastOnce)
            .await
            .unwrap();
        let sent = session.published_to("robots/a/success");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].json(), json!({"TaskToken": "t"}));
    }

    #[tokio::test]
    async fn test_mock_session_with_expectations() {
        let session = RecordingSession::new();
        session
            .expect_publish("robots/a/success")
            .return_err(TransportError::Closed);
        session
            .expect_publish("robots/a/success")
            .with_json(json!({"TaskToken": "t"}))
            .return_ok();

        let first = session
            .publish("robots/a/success", Bytes::from_static(b"{\"TaskToken\":\"t\"}"), DeliveryGuarantee::AtLeastOnce)
            .await;
        assert_eq!(first, Err(TransportError::Closed));

        let second = session
            .publish("robots/a/success", Bytes::from_static(b"{\"TaskToken\":\"t\"}"), DeliveryGuarantee::AtLeastOnce)
            .await;
        assert!(second.is_ok());

        assert_eq!(session.published().len(), 2);
        assert_eq!(session.published_to("robots/a/success").len(), 1);
        session.verify();
    }

    #[tokio::test]
    #[should_panic(expected = "Unexpected publishes")]
    async fn test_mock_session_flags_wrong_topic() {
        let session = RecordingSession::new();
        session.expect_publish("robots/a/success").return_ok();
        let _ = session
            .publish("robots/b/success", Bytes::new(), DeliveryGuarantee::AtLeastOnce)
            .await;
        session.verify();
    }
}
