use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cnetz_config::SharedConfig;
use cnetz_core::{timebase::SLOT_SECONDS, CnetzEntity, SlotTime};
use cnetz_saps::SapMsg;

use crate::CnetzEntityTrait;

#[derive(Default)]
pub enum MessagePrio {
    Immediate,
    #[default]
    Normal,
}

pub struct MessageQueue {
    messages: VecDeque<SapMsg>,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self { messages: VecDeque::new() }
    }

    pub fn push_back(&mut self, message: SapMsg) {
        self.messages.push_back(message);
    }

    pub fn push_prio(&mut self, message: SapMsg, prio: MessagePrio) {
        match prio {
            MessagePrio::Immediate => self.messages.push_front(message),
            MessagePrio::Normal => self.messages.push_back(message),
        }
    }

    pub fn pop_front(&mut self) -> Option<SapMsg> {
        self.messages.pop_front()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Single-threaded cooperative scheduler: one tick per slot, entities
/// exchange primitives through the queue, nothing blocks.
pub struct MessageRouter {
    /// While currently unused by the MessageRouter itself, entities may be
    /// reconfigured through it later
    _config: SharedConfig,
    entities: HashMap<CnetzEntity, Box<dyn CnetzEntityTrait>>,
    msg_queue: MessageQueue,

    /// The current slot time, incremented each tick
    ts: SlotTime,
}

impl MessageRouter {
    pub fn new(config: SharedConfig) -> Self {
        Self {
            entities: HashMap::new(),
            msg_queue: MessageQueue::new(),
            _config: config,
            ts: SlotTime::default(),
        }
    }

    /// Sets the global slot time, normally only at startup
    pub fn set_time(&mut self, ts: SlotTime) {
        self.ts = ts;
    }

    pub fn time(&self) -> SlotTime {
        self.ts
    }

    pub fn register_entity(&mut self, entity: Box<dyn CnetzEntityTrait>) {
        let comp_type = entity.entity();
        tracing::debug!("register_entity {:?}", comp_type);
        self.entities.insert(comp_type, entity);
    }

    /// Returns a mut ref to a component of the requested type
    pub fn get_entity(&mut self, comp: CnetzEntity) -> Option<&mut dyn CnetzEntityTrait> {
        self.entities.get_mut(&comp).map(|entity| entity.as_mut())
    }

    pub fn submit_message(&mut self, message: SapMsg) {
        tracing::debug!(
            "submit_message {:?}: {:?} -> {:?}",
            message.get_sap(),
            message.get_source(),
            message.get_dest()
        );
        self.msg_queue.push_back(message);
    }

    pub fn deliver_message(&mut self) {
        if let Some(message) = self.msg_queue.pop_front() {
            tracing::trace!(
                "deliver_message: got {:?}: {:?} -> {:?}",
                message.get_sap(),
                message.get_source(),
                message.get_dest()
            );

            let dest = *message.get_dest();
            if let Some(entity) = self.entities.get_mut(&dest) {
                entity.rx_prim(&mut self.msg_queue, message);
            } else {
                tracing::warn!(
                    "deliver_message: entity {:?} not found for {:?}",
                    dest,
                    message.get_sap()
                );
            }
        }
    }

    pub fn deliver_all_messages(&mut self) {
        while !self.msg_queue.is_empty() {
            self.deliver_message();
        }
    }

    pub fn get_msgqueue_len(&self) -> usize {
        self.msg_queue.len()
    }

    pub fn tick_start(&mut self) {
        tracing::trace!("--- tick {} ----------------------------", self.ts);

        for entity in self.entities.values_mut() {
            entity.tick_start(&mut self.msg_queue, self.ts);
        }
    }

    /// Executes all end-of-tick functions:
    /// - CallControl assembles the outbound telegram per channel
    /// - Coder encodes and hands the frames down to Phy
    pub fn tick_end(&mut self) {
        // CallControl schedules what to transmit in the next slot
        let target = CnetzEntity::CallControl;
        if let Some(entity) = self.entities.get_mut(&target) {
            entity.tick_end(&mut self.msg_queue, self.ts);
        }
        self.deliver_all_messages();

        // Then call tick_end on all other entities
        for entity in self.entities.values_mut() {
            if entity.entity() == CnetzEntity::CallControl {
                continue;
            }
            entity.tick_end(&mut self.msg_queue, self.ts);
        }
        self.deliver_all_messages();

        self.ts = self.ts.add_slots(1);
    }

    /// Runs one full slot tick
    pub fn run_tick(&mut self) {
        self.tick_start();
        while self.get_msgqueue_len() > 0 {
            self.deliver_all_messages();
        }
        self.tick_end();
    }

    /// Runs the full stack either forever or for a specified number of ticks.
    /// When the embedding audio layer does not pace the stack through sample
    /// input, each tick sleeps for one slot duration.
    pub fn run_stack(&mut self, num_ticks: Option<usize>, running: Option<Arc<AtomicBool>>) {
        let mut ticks: usize = 0;

        loop {
            self.run_tick();

            ticks += 1;
            if let Some(num_ticks) = num_ticks {
                if ticks >= num_ticks {
                    break;
                }
            }
            if let Some(ref running) = running {
                if !running.load(Ordering::SeqCst) {
                    break;
                }
            }
            if num_ticks.is_none() {
                std::thread::sleep(Duration::from_secs_f64(SLOT_SECONDS));
            }
        }

        // Let entities release transactions and call references
        let ts = self.ts;
        for entity in self.entities.values_mut() {
            entity.shutdown(&mut self.msg_queue, ts);
        }
        self.deliver_all_messages();
    }
}
