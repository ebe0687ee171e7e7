//! The System context: owns the channel collection, the subscriber registry
//! and all live transactions. Passed by reference into every call-control
//! operation; there is no hidden global state.

use std::collections::HashMap;

use cnetz_core::{Futln, SlotTime};

use crate::cc::channel::Channel;
use crate::cc::registry::SubscriberRegistry;
use crate::cc::transaction::{StateSet, TransId, TransState, Transaction};

pub struct System {
    pub channels: Vec<Channel>,
    pub registry: SubscriberRegistry,
    transactions: HashMap<TransId, Transaction>,
    next_trans_id: TransId,
}

impl System {
    pub fn new(channels: Vec<Channel>, registry: SubscriberRegistry) -> Self {
        Self {
            channels,
            registry,
            transactions: HashMap::new(),
            next_trans_id: 1,
        }
    }

    /// Create a transaction linked to the given channel
    pub fn create_transaction(
        &mut self,
        futln: Futln,
        chan_idx: usize,
        state: TransState,
        now: SlotTime,
    ) -> TransId {
        let id = self.next_trans_id;
        self.next_trans_id = self.next_trans_id.wrapping_add(1).max(1);
        let trans = Transaction::new(id, futln, chan_idx, state, now);
        tracing::debug!("create {} on chan {}", trans, self.channels[chan_idx].nr);
        self.channels[chan_idx].link(id);
        self.transactions.insert(id, trans);
        id
    }

    /// Destroy a transaction, unlinking it from its channel.
    /// The external call reference must have been released by the caller.
    pub fn destroy_transaction(&mut self, id: TransId) -> Option<Transaction> {
        let trans = self.transactions.remove(&id)?;
        cnetz_core::assert_warn!(
            trans.call_ref == 0,
            "destroying {} with live call reference {}",
            trans,
            trans.call_ref
        );
        self.channels[trans.chan_idx].unlink(id);
        tracing::debug!("destroy {}", trans);
        Some(trans)
    }

    /// Move a transaction to another channel (the control-to-traffic
    /// hand-off). Unlinks first; a transaction is never on two channels.
    pub fn relink(&mut self, id: TransId, to_idx: usize) {
        let trans = self.transactions.get_mut(&id).expect("relink of unknown transaction");
        let from_idx = trans.chan_idx;
        self.channels[from_idx].unlink(id);
        self.channels[to_idx].link(id);
        trans.chan_idx = to_idx;
        tracing::debug!(
            "relink #{} chan {} -> {}",
            id,
            self.channels[from_idx].nr,
            self.channels[to_idx].nr
        );
    }

    pub fn trans(&self, id: TransId) -> Option<&Transaction> {
        self.transactions.get(&id)
    }

    pub fn trans_mut(&mut self, id: TransId) -> Option<&mut Transaction> {
        self.transactions.get_mut(&id)
    }

    /// Find the transaction of a subscriber in one of the given states
    pub fn find_by_futln(&self, futln: Futln, states: StateSet) -> Option<TransId> {
        self.transactions
            .values()
            .filter(|t| t.futln == futln && states.contains(t.state))
            .map(|t| t.id)
            .min()
    }

    /// Transactions linked to a channel in one of the given states,
    /// ordered by id for deterministic scheduling
    pub fn find_on_channel(&self, chan_idx: usize, states: StateSet) -> Vec<TransId> {
        let mut ids: Vec<TransId> = self.channels[chan_idx]
            .linked()
            .iter()
            .copied()
            .filter(|id| {
                self.transactions
                    .get(id)
                    .is_some_and(|t| states.contains(t.state))
            })
            .collect();
        ids.sort_unstable();
        ids
    }

    /// All transaction ids, ordered by id
    pub fn ids(&self) -> Vec<TransId> {
        let mut ids: Vec<TransId> = self.transactions.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn count(&self) -> usize {
        self.transactions.len()
    }

    pub fn chan_idx_by_nr(&self, nr: cnetz_core::ChanNr) -> Option<usize> {
        self.channels.iter().position(|c| c.nr == nr)
    }
}
