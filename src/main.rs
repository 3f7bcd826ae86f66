//! Demo entry point.
//!
//! Stands up an in-process broker, one simulated robot and a dispatcher, then
//! pushes a few smoothie orders through the full exchange:
//!
//! 1. The dispatcher picks an `ONLINE` robot and publishes the order.
//! 2. The robot works for `ROBOT_WORK_MS` and publishes the completion.
//! 3. The dispatcher matches the token and frees the robot.
//!
//! Set `ROBOT_DEMO_SERVE=1` to keep the robot running after the demo orders
//! until Ctrl-C.

use robot_device::dispatcher::Dispatcher;
use robot_device::framework::{LocalSession, MessagingSession};
use robot_device::lifecycle::{setup_tracing, DeviceConfig, RobotDevice};
use std::sync::Arc;
use tracing::{error, info, Instrument};

const DEMO_ORDERS: [&str; 3] = ["Mango Tango", "Berry Blast", "Green Machine"];

#[tokio::main]
async fn main() -> Result<(), String> {
    setup_tracing();

    let config = DeviceConfig::from_env().map_err(|e| e.to_string())?;
    info!(client_id = %config.client_id, work = ?config.work_duration, "Starting device demo");

    let local = Arc::new(LocalSession::new());
    let session: Arc<dyn MessagingSession> = local.clone();

    let device = RobotDevice::new(session.clone(), &config);
    device.start().await.map_err(|e| e.to_string())?;

    let dispatcher = Dispatcher::start(session, config.topics.clone(), config.dispatch_timeout)
        .await
        .map_err(|e| e.to_string())?;
    dispatcher.fleet().register(device.client_id());

    for smoothie in DEMO_ORDERS {
        let span = tracing::info_span!("dispatch", smoothie);
        let result = async { dispatcher.dispatch(smoothie).await }
            .instrument(span)
            .await;
        match result {
            Ok(notice) => info!(device_id = %notice.device_id, task_token = %notice.task_token, "Smoothie made"),
            Err(e) => error!(error = %e, "Order failed"),
        }
    }

    if std::env::var("ROBOT_DEMO_SERVE").is_ok_and(|v| v == "1") {
        info!("Serving orders until Ctrl-C");
        tokio::signal::ctrl_c().await.map_err(|e| e.to_string())?;
    }

    device.shutdown();
    local.close().await;
    info!(stats = ?device.stats(), fleet = ?dispatcher.fleet().snapshot(), "Demo complete");
    Ok(())
}
