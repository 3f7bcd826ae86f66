//! The order handler: one inbound order in, one completion out.

use crate::framework::{DeliveryGuarantee, MessageHandler, MessagingSession};
use crate::lifecycle::ShutdownSignal;
use crate::model::{parse_device_id, Completion, Order, TopicScheme};
use crate::order_handler::{
    Claim, DuplicatePolicy, HandlerError, HandlerStats, RetryPolicy, StatsSnapshot, TokenLedger,
    WorkSimulator,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn, Span};

/// Where a single order message is in its lifecycle.
///
/// `Received → Decoded → Working → Completed`, with `Error` reachable from
/// `Received` (payload is not JSON) and `Decoded` (no token, bad topic).
/// Every terminal state is final; nothing loops back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStage {
    Received,
    Decoded,
    Working,
    Completed,
    Error,
}

impl fmt::Display for OrderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OrderStage::Received => "received",
            OrderStage::Decoded => "decoded",
            OrderStage::Working => "working",
            OrderStage::Completed => "completed",
            OrderStage::Error => "error",
        };
        f.write_str(name)
    }
}

/// How an order that did not fail ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderOutcome {
    /// The completion was published to `topic`.
    Completed {
        device_id: String,
        task_token: String,
        topic: String,
        attempts: u32,
    },
    /// The token was already handled and [`DuplicatePolicy::Suppress`] is active.
    DuplicateSuppressed { device_id: String, task_token: String },
}

/// Turns order deliveries into completion publishes.
///
/// # Concurrency
/// The handler keeps no per-device state. Two deliveries may be processed at
/// the same time if the session delivers concurrently; each only touches the
/// fields of its own message. The optional duplicate ledger and the stats
/// counters are internally synchronised.
pub struct OrderHandler {
    session: Arc<dyn MessagingSession>,
    simulator: Arc<dyn WorkSimulator>,
    topics: TopicScheme,
    retry: RetryPolicy,
    ledger: Option<TokenLedger>,
    shutdown: ShutdownSignal,
    stats: HandlerStats,
}

impl OrderHandler {
    /// Creates a handler with the default topic scheme and policies.
    pub fn new(session: Arc<dyn MessagingSession>, simulator: Arc<dyn WorkSimulator>) -> Self {
        Self {
            session,
            simulator,
            topics: TopicScheme::default(),
            retry: RetryPolicy::default(),
            ledger: None,
            shutdown: ShutdownSignal::never(),
            stats: HandlerStats::default(),
        }
    }

    pub fn with_topics(mut self, topics: TopicScheme) -> Self {
        self.topics = topics;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_duplicates(mut self, policy: DuplicatePolicy) -> Self {
        self.ledger = policy.ledger();
        self
    }

    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn topics(&self) -> &TopicScheme {
        &self.topics
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Processes one order and reports how it ended.
    ///
    /// Every call is counted in [`OrderHandler::stats`]. The session only sees
    /// [`MessageHandler::on_message`], which logs failures instead of returning them.
    pub async fn handle_order(&self, topic: &str, payload: &[u8]) -> Result<OrderOutcome, HandlerError> {
        self.stats.record_received();
        let result = self.process(topic, payload).await;
        self.stats.record(&result);
        result
    }

    #[instrument(
        name = "order",
        skip(self, payload),
        fields(device_id = tracing::field::Empty, task_token = tracing::field::Empty)
    )]
    async fn process(&self, topic: &str, payload: &[u8]) -> Result<OrderOutcome, HandlerError> {
        debug!(stage = %OrderStage::Received, bytes = payload.len(), "Order received");

        let document: serde_json::Value =
            serde_json::from_slice(payload).map_err(|e| HandlerError::malformed(topic, e))?;
        debug!(stage = %OrderStage::Decoded, "Payload decoded");

        let order = Order::from_value(document).map_err(|e| HandlerError::malformed(topic, e))?;
        let device_id = parse_device_id(topic)?;

        let span = Span::current();
        span.record("device_id", device_id);
        span.record("task_token", order.task_token.as_str());

        let Some(ledger) = &self.ledger else {
            return self.work_and_complete(device_id, &order).await;
        };

        let guard = loop {
            match ledger.claim(&order.task_token) {
                Claim::Granted(guard) => break guard,
                Claim::Completed => {
                    info!("Duplicate order, completion not republished");
                    return Ok(OrderOutcome::DuplicateSuppressed {
                        device_id: device_id.to_string(),
                        task_token: order.task_token,
                    });
                }
                Claim::InFlight(mut settled) => {
                    debug!("Same token in flight, waiting for its outcome");
                    tokio::select! {
                        biased;
                        _ = self.shutdown.cancelled() => {
                            return Err(HandlerError::Cancelled {
                                task_token: order.task_token,
                            });
                        }
                        _ = settled.changed() => {}
                    }
                }
            }
        };

        // A failed or cancelled attempt drops the guard, which frees the token
        // for any delivery waiting on it.
        let outcome = self.work_and_complete(device_id, &order).await?;
        guard.complete();
        Ok(outcome)
    }

    async fn work_and_complete(&self, device_id: &str, order: &Order) -> Result<OrderOutcome, HandlerError> {
        debug!(
            stage = %OrderStage::Working,
            smoothie = ?order.smoothie,
            expected = ?self.simulator.nominal_duration(),
            "Working"
        );

        let cancelled = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => true,
            _ = self.simulator.perform(order) => false,
        };
        if cancelled {
            return Err(HandlerError::Cancelled {
                task_token: order.task_token.clone(),
            });
        }

        let payload = Completion::new(order.task_token.as_str())
            .encode()
            .map_err(|e| HandlerError::Encode(e.to_string()))?;
        let topic = self.topics.success_topic(device_id);
        let attempts = self.publish_completion(&topic, &order.task_token, payload).await?;

        info!(stage = %OrderStage::Completed, %topic, attempts, "Completion published");
        Ok(OrderOutcome::Completed {
            device_id: device_id.to_string(),
            task_token: order.task_token.clone(),
            topic,
            attempts,
        })
    }

    /// Publishes with the configured retry policy. Returns the attempt that succeeded.
    async fn publish_completion(&self, topic: &str, task_token: &str, payload: Bytes) -> Result<u32, HandlerError> {
        let max_attempts = self.retry.attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let result = self
                .session
                .publish(topic, payload.clone(), DeliveryGuarantee::AtLeastOnce)
                .await;

            let error = match result {
                Ok(()) => return Ok(attempt),
                Err(e) if attempt >= max_attempts => {
                    return Err(HandlerError::PublishFailure {
                        topic: topic.to_string(),
                        task_token: task_token.to_string(),
                        attempts: attempt,
                        source: e,
                    });
                }
                Err(e) => e,
            };

            let delay = self.retry.backoff_for(attempt);
            warn!(attempt, max_attempts, ?delay, error = %error, "Completion publish failed, retrying");

            let cancelled = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => true,
                _ = tokio::time::sleep(delay) => false,
            };
            if cancelled {
                return Err(HandlerError::Cancelled {
                    task_token: task_token.to_string(),
                });
            }
        }
    }
}

#[async_trait]
impl MessageHandler for OrderHandler {
    async fn on_message(&self, topic: &str, payload: &[u8]) {
        match self.handle_order(topic, payload).await {
            Ok(_) => {}
            Err(e @ HandlerError::MalformedOrder { .. }) | Err(e @ HandlerError::InvalidTopic(_)) => {
                warn!(stage = %OrderStage::Error, %topic, error = %e, "Dropping order");
            }
            Err(e @ HandlerError::Cancelled { .. }) => {
                info!(stage = %OrderStage::Error, %topic, error = %e, "Order abandoned at shutdown");
            }
            Err(e) => {
                error!(stage = %OrderStage::Error, %topic, error = %e, "Order completion lost");
            }
        }
    }
}
