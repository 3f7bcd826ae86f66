use crate::framework::{DeliveryGuarantee, MessagingSession, TransportError};
use crate::lifecycle::{shutdown_channel, DeviceConfig, ShutdownTrigger};
use crate::order_handler::{self, OrderHandler, StatsSnapshot, WorkSimulator};
use std::sync::Arc;
use tracing::info;

/// A simulated worker device bound to one messaging session.
///
/// `RobotDevice` is responsible for:
/// - **Wiring**: Building the [`OrderHandler`] from configuration and the session
/// - **Subscription**: Registering the handler on `robots/+/order`
/// - **Shutdown**: Cancelling in-flight work so no stale completions go out
///
/// The session itself is owned by whoever established it; closing it is their job.
///
/// # Example
///
/// ```ignore
/// let session = Arc::new(LocalSession::new());
/// let device = RobotDevice::new(session.clone(), &DeviceConfig::default());
/// device.start().await?;
///
/// // ... orders flow ...
///
/// device.shutdown();
/// session.close().await;
/// ```
pub struct RobotDevice {
    client_id: String,
    session: Arc<dyn MessagingSession>,
    handler: Arc<OrderHandler>,
    shutdown: ShutdownTrigger,
}

impl RobotDevice {
    /// Creates a device whose work takes `config.work_duration`.
    pub fn new(session: Arc<dyn MessagingSession>, config: &DeviceConfig) -> Self {
        let (shutdown, signal) = shutdown_channel();
        let handler = order_handler::new(session.clone(), config, signal);
        Self::assemble(session, config, handler, shutdown)
    }

    /// Creates a device with a caller-supplied work simulator.
    pub fn with_simulator(
        session: Arc<dyn MessagingSession>,
        config: &DeviceConfig,
        simulator: Arc<dyn WorkSimulator>,
    ) -> Self {
        let (shutdown, signal) = shutdown_channel();
        let handler = order_handler::with_simulator(session.clone(), config, simulator, signal);
        Self::assemble(session, config, handler, shutdown)
    }

    fn assemble(
        session: Arc<dyn MessagingSession>,
        config: &DeviceConfig,
        handler: OrderHandler,
        shutdown: ShutdownTrigger,
    ) -> Self {
        Self {
            client_id: config.client_id.clone(),
            session,
            handler: Arc::new(handler),
            shutdown,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.handler.stats()
    }

    /// Subscribes the order handler. Orders start flowing once this returns.
    pub async fn start(&self) -> Result<(), TransportError> {
        let filter = self.handler.topics().order_filter();
        info!(client_id = %self.client_id, %filter, "Subscribing to orders");
        self.session
            .subscribe(&filter, DeliveryGuarantee::AtLeastOnce, self.handler.clone())
            .await?;
        info!(client_id = %self.client_id, "Device ready");
        Ok(())
    }

    /// Begins shutdown.
    ///
    /// Orders still in their work phase (or waiting to retry a publish) stop
    /// without publishing. Orders delivered afterwards are dropped the same way.
    pub fn shutdown(&self) {
        info!(client_id = %self.client_id, stats = ?self.stats(), "Shutting down device");
        self.shutdown.trigger();
    }
}
