//! # Observability & Tracing
//!
//! [`setup_tracing`] initializes structured logging for the device with the
//! `tracing` crate. Every order is handled inside an `order` span carrying the
//! inbound `topic`, and once known, the `device_id` and `task_token`.
//!
//! ## Usage Examples
//!
//! ```bash
//! # Order lifecycle at info level (received orders, published completions, drops)
//! RUST_LOG=info cargo run
//!
//! # Every stage transition of every order
//! RUST_LOG=debug cargo run
//!
//! # Only the handler
//! RUST_LOG=robot_device::order_handler=debug cargo run
//! ```
//!
//! ## What a Completed Order Looks Like
//!
//! **With `RUST_LOG=debug`**:
//!
//! ```text
//! DEBUG order: Order received stage=received bytes=64 topic="robots/arm-7/order"
//! DEBUG order: Payload decoded stage=decoded
//! DEBUG order: Working stage=working smoothie=Some("Mango")
//! DEBUG order: Simulating work duration=3s smoothie=Some("Mango")
//!  INFO order: Completion published stage=completed topic=robots/arm-7/success attempts=1
//! ```
//!
//! A dropped order logs a single `WARN Dropping order stage=error ...` line with
//! the reason.
pub fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false) // The span name already says which leg of the exchange logged.
        .compact()
        .init();
}
