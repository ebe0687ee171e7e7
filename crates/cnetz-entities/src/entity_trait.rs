use as_any::AsAny;
use cnetz_config::SharedConfig;
use cnetz_core::{CnetzEntity, SlotTime};
use cnetz_saps::SapMsg;

use crate::MessageQueue;

/// Trait for stack entities.
/// Used by MessageRouter for passing messages between entities.
pub trait CnetzEntityTrait: Send + AsAny {
    /// Returns the entity type identifier
    fn entity(&self) -> CnetzEntity;

    /// Handle incoming SAP primitive
    fn rx_prim(&mut self, queue: &mut MessageQueue, message: SapMsg);

    /// Update configuration (optional)
    #[allow(dead_code)]
    fn set_config(&mut self, _config: SharedConfig) {}

    /// Called at the start of each slot tick
    fn tick_start(&mut self, _queue: &mut MessageQueue, _ts: SlotTime) {}

    /// Called at the end of each slot tick
    fn tick_end(&mut self, _queue: &mut MessageQueue, _ts: SlotTime) -> bool {
        false
    }

    /// Called once when the stack shuts down; entities release held
    /// resources (transactions, call references) here
    fn shutdown(&mut self, _queue: &mut MessageQueue, _ts: SlotTime) {}
}
