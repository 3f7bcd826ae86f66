#![doc(html_logo_url = "https://www.rust-lang.org/logos/rust-logo-128x128.png")]
#![doc(html_favicon_url = "https://www.rust-lang.org/favicon.ico")]
//! # Robot Device
//!
//! > **A simulated worker device on a publish/subscribe channel.**
//!
//! The device subscribes to `robots/+/order`, takes each order's `task_token`,
//! spends a configurable amount of time "working", and publishes
//! `{"TaskToken": <token>}` to `robots/{device}/success` so the dispatcher that
//! issued the order knows it is done.
//!
//! ## 🏗️ Design Philosophy
//!
//! ### Capabilities, not globals
//! The handler never reaches for a global connection. It is handed a
//! [`MessagingSession`](framework::MessagingSession) and a
//! [`WorkSimulator`](order_handler::WorkSimulator) when it is built, so tests can
//! give it a recording session and an instant simulator.
//!
//! ### Stateless per message
//! Each delivery is decoded, worked and completed using only its own topic and
//! payload. Whether deliveries overlap is decided by the session, and the handler
//! is correct either way.
//!
//! ### Log and drop
//! A pub/sub delivery cannot be rejected, so a bad order is logged and dropped.
//! No failure of one order stops the device from taking the next.
//!
//! ### Observability
//! Every order runs inside an `order` span; stage transitions are traced at
//! `debug`, outcomes at `info`/`warn`/`error`. See [`lifecycle::tracing`].
//!
//! ## 🗺️ Module Tour
//!
//! ### 1. The Seam ([`framework`])
//! - **Role**: The session contract plus an in-process broker and a recording mock.
//! - **Key items**: [`MessagingSession`](framework::MessagingSession),
//!   [`MessageHandler`](framework::MessageHandler), [`LocalSession`](framework::LocalSession).
//!
//! ### 2. The Wire ([`model`])
//! - **Role**: Order and completion payloads, topic parsing.
//! - **Key items**: [`Order`](model::Order), [`Completion`](model::Completion),
//!   [`TopicScheme`](model::TopicScheme).
//!
//! ### 3. The Core ([`order_handler`])
//! - **Role**: One order in, one completion out.
//! - **Key items**: [`OrderHandler`](order_handler::OrderHandler),
//!   [`RetryPolicy`](order_handler::RetryPolicy), [`DuplicatePolicy`](order_handler::DuplicatePolicy).
//!
//! ### 4. The Other Side ([`dispatcher`])
//! - **Role**: Sends orders to robots and waits for their tokens to come back.
//! - **Key items**: [`Dispatcher`](dispatcher::Dispatcher), [`Fleet`](dispatcher::Fleet).
//!
//! ### 5. The Orchestrator ([`lifecycle`])
//! - **Role**: Configuration, wiring, shutdown and logging.
//! - **Key items**: [`RobotDevice`](lifecycle::RobotDevice), [`DeviceConfig`](lifecycle::DeviceConfig).
//!
//! ## 🚀 Quick Start
//!
//! ```bash
//! # Demo: one device, one dispatcher, an in-process broker
//! RUST_LOG=info ROBOT_WORK_MS=500 cargo run
//!
//! cargo test
//! ```

pub mod dispatcher;
pub mod framework;
pub mod lifecycle;
pub mod model;
pub mod order_handler;
