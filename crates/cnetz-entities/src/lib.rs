#![allow(dead_code)]

pub mod cc;
pub mod coder;
pub mod entity_trait;
pub mod line;
pub mod messagerouter;
pub mod phy;

// Re-export commonly used items from router
pub use entity_trait::CnetzEntityTrait;
pub use messagerouter::{MessagePrio, MessageQueue, MessageRouter};
