//! # Dispatcher
//!
//! The other side of the exchange: issues orders to robots and waits for their
//! completions.
//!
//! ## Order Flow
//!
//! [`Dispatcher::dispatch`] walks one order through the steps the dispatcher
//! owns:
//!
//! 1. **Pick a robot** - the first `ONLINE` robot in the [`Fleet`] becomes `WORKING`.
//! 2. **Tell the robot** - `{"task_token", "smoothie"}` goes to `robots/{robot}/order`.
//! 3. **Wait for the token** - a completion on `robots/+/success` carrying the
//!    same `TaskToken` resolves the order.
//! 4. **Settle the robot** - back to `ONLINE` on success, `BROKEN` on timeout.
//!
//! Task tokens are random v4 UUIDs and mean nothing to the robot; it only echoes
//! them back.

pub mod error;
pub mod fleet;

pub use error::*;
pub use fleet::*;

use crate::framework::{DeliveryGuarantee, MessageHandler, MessagingSession};
use crate::model::{parse_device_id, Completion, Order, TopicScheme};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, instrument, warn};

/// A completion as observed by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionNotice {
    /// Device segment of the topic the completion arrived on.
    pub device_id: String,
    pub task_token: String,
}

type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<CompletionNotice>>>>;

/// Subscribed to the success filter; resolves pending tokens.
struct CompletionListener {
    pending: PendingMap,
}

#[async_trait]
impl MessageHandler for CompletionListener {
    async fn on_message(&self, topic: &str, payload: &[u8]) {
        let device_id = match parse_device_id(topic) {
            Ok(device_id) => device_id,
            Err(e) => {
                warn!(error = %e, "Ignoring completion");
                return;
            }
        };
        let completion = match Completion::decode(payload) {
            Ok(completion) => completion,
            Err(e) => {
                warn!(%topic, error = %e, "Ignoring undecodable completion");
                return;
            }
        };

        let waiter = self.pending.lock().remove(&completion.task_token);
        match waiter {
            Some(waiter) => {
                info!(device_id, task_token = %completion.task_token, "Completion received");
                let _ = waiter.send(CompletionNotice {
                    device_id: device_id.to_string(),
                    task_token: completion.task_token,
                });
            }
            None => {
                debug!(device_id, task_token = %completion.task_token, "Completion for unknown or resolved token");
            }
        }
    }
}

/// An order that has been published and is waiting for its completion.
///
/// Dropping it without waiting forgets the token; a completion that arrives
/// later is ignored like any other unknown token.
#[derive(Debug)]
pub struct PendingOrder {
    pub robot: String,
    pub task_token: String,
    receiver: oneshot::Receiver<CompletionNotice>,
    pending: PendingMap,
    timeout: Duration,
}

impl PendingOrder {
    /// Waits for the completion, up to the dispatcher's timeout.
    pub async fn wait(self) -> Result<CompletionNotice, DispatchError> {
        let timeout = self.timeout;
        self.wait_for(timeout).await
    }

    pub async fn wait_for(mut self, timeout: Duration) -> Result<CompletionNotice, DispatchError> {
        match tokio::time::timeout(timeout, &mut self.receiver).await {
            Ok(Ok(notice)) => Ok(notice),
            Ok(Err(_)) => Err(DispatchError::Abandoned(self.task_token.clone())),
            Err(_) => Err(DispatchError::Timeout {
                robot: self.robot.clone(),
                task_token: self.task_token.clone(),
            }),
        }
    }
}

impl Drop for PendingOrder {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.task_token);
    }
}

pub struct Dispatcher {
    session: Arc<dyn MessagingSession>,
    topics: TopicScheme,
    fleet: Arc<Fleet>,
    pending: PendingMap,
    timeout: Duration,
}

impl Dispatcher {
    /// Subscribes to completions and returns a ready dispatcher.
    pub async fn start(
        session: Arc<dyn MessagingSession>,
        topics: TopicScheme,
        timeout: Duration,
    ) -> Result<Self, DispatchError> {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let listener = Arc::new(CompletionListener {
            pending: pending.clone(),
        });
        session
            .subscribe(&topics.success_filter(), DeliveryGuarantee::AtLeastOnce, listener)
            .await?;
        info!(filter = %topics.success_filter(), "Dispatcher listening for completions");

        Ok(Self {
            session,
            topics,
            fleet: Arc::new(Fleet::new()),
            pending,
            timeout,
        })
    }

    pub fn fleet(&self) -> &Arc<Fleet> {
        &self.fleet
    }

    /// Orders currently waiting for a completion.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Publishes an order to `robot` and returns a handle to await its completion.
    #[instrument(skip(self))]
    pub async fn send_order(&self, robot: &str, smoothie: Option<&str>) -> Result<PendingOrder, DispatchError> {
        if robot.is_empty() || robot.contains(['/', '+', '#']) {
            return Err(DispatchError::InvalidRobot(robot.to_string()));
        }

        let order = Order::new(uuid::Uuid::new_v4().to_string(), smoothie.map(str::to_string));
        let payload = order.encode().map_err(|e| DispatchError::Encode(e.to_string()))?;
        let topic = self.topics.order_topic(robot);

        let (sender, receiver) = oneshot::channel();
        self.pending.lock().insert(order.task_token.clone(), sender);

        if let Err(e) = self
            .session
            .publish(&topic, payload, DeliveryGuarantee::AtLeastOnce)
            .await
        {
            self.pending.lock().remove(&order.task_token);
            warn!(%topic, error = %e, "Order publish failed");
            return Err(e.into());
        }
        info!(%topic, task_token = %order.task_token, "Order sent");

        Ok(PendingOrder {
            robot: robot.to_string(),
            task_token: order.task_token,
            receiver,
            pending: self.pending.clone(),
            timeout: self.timeout,
        })
    }

    /// Runs one order end to end against the fleet.
    ///
    /// On timeout the robot is marked `BROKEN` and stays out of rotation until
    /// it is registered again.
    #[instrument(skip(self))]
    pub async fn dispatch(&self, smoothie: &str) -> Result<CompletionNotice, DispatchError> {
        let robot = self.fleet.claim_available().ok_or(DispatchError::NoAvailableRobot)?;

        let pending = match self.send_order(&robot, Some(smoothie)).await {
            Ok(pending) => pending,
            Err(e) => {
                self.fleet.set_status(&robot, RobotStatus::Online);
                return Err(e);
            }
        };

        match pending.wait().await {
            Ok(notice) => {
                self.fleet.set_status(&robot, RobotStatus::Online);
                Ok(notice)
            }
            Err(e) => {
                warn!(%robot, error = %e, "Robot missed its deadline");
                self.fleet.set_status(&robot, RobotStatus::Broken);
                Err(e)
            }
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        // Dropping the senders wakes every waiter with `Abandoned`.
        let abandoned = std::mem::take(&mut *self.pending.lock());
        if !abandoned.is_empty() {
            warn!(orders = abandoned.len(), "Dispatcher dropped with orders pending");
        }
    }
}
