//! Messaging framework: the session contract and its implementations.
//!
//! This module provides the seam the device logic is written against, plus two
//! sessions that satisfy it without a network broker.
//!
//! # Main Components
//!
//! - [`MessagingSession`] - Capability to subscribe and publish on a live broker session
//! - [`MessageHandler`] - One-method callback interface driven by a session
//! - [`LocalSession`] - In-process broker with MQTT-style filter matching
//! - [`TransportError`] - Errors a session can report
//!
//! # Testing
//!
//! See the [`mock`] module for a recording session with expectations.

pub mod core;
pub mod local;
pub mod mock;

// Re-export core types for convenience
pub use self::core::*;
pub use local::{DeliveryMode, LocalSession};
