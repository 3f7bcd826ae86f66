//! Wire data: order and completion payloads, and the topic layout they travel on.

pub mod order;
pub mod topic;

pub use order::*;
pub use topic::*;
