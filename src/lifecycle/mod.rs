//! # Device Lifecycle
//!
//! Everything needed to stand a device up and take it down again:
//!
//! - [`RobotDevice`] - wires session, handler and shutdown together
//! - [`DeviceConfig`] - defaults plus `ROBOT_*` environment overrides
//! - [`shutdown_channel`] - the cancellation signal shared with in-flight orders
//! - [`setup_tracing`] - logging initialisation
//!
//! Establishing the broker session happens before any of this and is out of
//! scope; the binary uses an in-process [`LocalSession`](crate::framework::LocalSession).

pub mod config;
pub mod device;
pub mod shutdown;
pub mod tracing;

pub use config::*;
pub use device::*;
pub use shutdown::*;
pub use self::tracing::*;
