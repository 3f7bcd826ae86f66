//! Shutdown signalling.
//!
//! A [`ShutdownTrigger`] is held by whoever owns the device's lifetime; every
//! handler holds a [`ShutdownSignal`] cloned from it. Triggering is sticky:
//! once set, every current and future wait on the signal returns immediately.

use tokio::sync::watch;

/// Creates a connected trigger/signal pair.
pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, ShutdownSignal { rx })
}

#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// A signal that is never triggered.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has been triggered.
    ///
    /// If the trigger is dropped without firing this never resolves.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        let triggered = rx.wait_for(|stopped| *stopped).await.is_ok();
        if !triggered {
            std::future::pending::<()>().await;
        }
    }
}
