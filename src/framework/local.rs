//! # In-Memory Broker
//!
//! [`LocalSession`] is a [`MessagingSession`] that routes publishes to
//! subscribers inside the same process. It backs the demo binary and the
//! integration tests, and lets a device and a dispatcher talk to each other
//! without a network broker.
//!
//! Each subscription owns a bounded queue drained by its own Tokio task. The
//! [`DeliveryMode`] decides whether that task awaits each handler invocation
//! before taking the next message (one connection, one message at a time) or
//! fans deliveries out so their handlers overlap.

use crate::framework::{
    topic_matches, Delivery, DeliveryGuarantee, MessageHandler, MessagingSession, TransportError,
};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

/// How a subscription's queued deliveries reach its handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    /// One handler invocation at a time, in arrival order.
    #[default]
    Serialized,
    /// Every delivery gets its own task; handler invocations may overlap.
    Concurrent,
}

struct Subscription {
    filter: String,
    guarantee: DeliveryGuarantee,
    sender: mpsc::Sender<Delivery>,
}

/// In-process broker session.
pub struct LocalSession {
    subscriptions: RwLock<Vec<Subscription>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    mode: DeliveryMode,
    buffer_size: usize,
    closed: AtomicBool,
}

impl LocalSession {
    /// Creates a session with serialized delivery and a queue of 64 per subscription.
    pub fn new() -> Self {
        Self::with_mode(DeliveryMode::Serialized, 64)
    }

    pub fn with_mode(mode: DeliveryMode, buffer_size: usize) -> Self {
        Self {
            subscriptions: RwLock::new(Vec::new()),
            tasks: Mutex::new(Vec::new()),
            mode,
            buffer_size: buffer_size.max(1),
            closed: AtomicBool::new(false),
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Closes the session and waits for queued deliveries to drain.
    ///
    /// Dropping the queue senders ends each subscription task once its queue is
    /// empty. Publishes issued after this call fail with [`TransportError::Closed`].
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let dropped = {
            let mut subs = self.subscriptions.write();
            let count = subs.len();
            subs.clear();
            count
        };
        info!(subscriptions = dropped, "Closing local session");

        let handles: Vec<_> = std::mem::take(&mut *self.tasks.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Delivery task failed");
            }
        }
        info!("Local session closed");
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }
}

impl Default for LocalSession {
    fn default() -> Self {
        Self::new()
    }
}

async fn drain_serialized(mut receiver: mpsc::Receiver<Delivery>, handler: Arc<dyn MessageHandler>) {
    while let Some(delivery) = receiver.recv().await {
        handler.on_message(&delivery.topic, &delivery.payload).await;
    }
}

async fn drain_concurrent(mut receiver: mpsc::Receiver<Delivery>, handler: Arc<dyn MessageHandler>) {
    let mut in_flight = JoinSet::new();
    while let Some(delivery) = receiver.recv().await {
        let handler = handler.clone();
        in_flight.spawn(async move {
            handler.on_message(&delivery.topic, &delivery.payload).await;
        });
        // Reap finished invocations so the set does not grow without bound.
        while in_flight.try_join_next().is_some() {}
    }
    while in_flight.join_next().await.is_some() {}
}

#[async_trait]
impl MessagingSession for LocalSession {
    async fn subscribe(
        &self,
        filter: &str,
        guarantee: DeliveryGuarantee,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), TransportError> {
        // `close` flips the flag before it takes this lock, so checking under
        // the lock means a subscription is either rejected or seen by `close`.
        let mut subscriptions = self.subscriptions.write();
        self.ensure_open()?;

        let (sender, receiver) = mpsc::channel(self.buffer_size);
        let task = match self.mode {
            DeliveryMode::Serialized => tokio::spawn(drain_serialized(receiver, handler)),
            DeliveryMode::Concurrent => tokio::spawn(drain_concurrent(receiver, handler)),
        };

        subscriptions.push(Subscription {
            filter: filter.to_string(),
            guarantee,
            sender,
        });
        self.tasks.lock().push(task);
        drop(subscriptions);
        info!(filter, %guarantee, mode = ?self.mode, "Subscribed");
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Bytes,
        guarantee: DeliveryGuarantee,
    ) -> Result<(), TransportError> {
        self.ensure_open()?;

        // Collect targets first; the lock must not be held across an await.
        let targets: Vec<_> = self
            .subscriptions
            .read()
            .iter()
            .filter(|sub| topic_matches(&sub.filter, topic))
            .map(|sub| (sub.filter.clone(), sub.guarantee.min(guarantee), sub.sender.clone()))
            .collect();

        debug!(topic, %guarantee, matched = targets.len(), "Publish");

        for (filter, effective, sender) in targets {
            let delivery = Delivery::new(topic, payload.clone());
            let sent = match effective {
                DeliveryGuarantee::AtLeastOnce => sender.send(delivery).await.is_ok(),
                DeliveryGuarantee::AtMostOnce => sender.try_send(delivery).is_ok(),
            };
            if !sent {
                warn!(topic, filter = %filter, "Delivery dropped");
            }
        }
        Ok(())
    }
}
