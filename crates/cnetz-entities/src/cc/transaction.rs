use cnetz_core::{CallRef, Cause, Futln, SlotTime};

use crate::cc::timer::SlotTimer;

pub type TransId = u32;

/// Protocol state of one call-control leg
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransState {
    // Registration: answered on the next scheduler pass, no timer
    AttachPending,
    RoamPending,

    // Mobile-terminated paging
    PageQueued,
    PageDelay,
    PageGranted,
    PageAckWait,

    // Mobile-originated call on the control channel
    DialInvited,
    DialReceived,
    AcceptPending,
    CallQueued,
    CallDelay,
    CallGranted,

    // On the traffic channel
    SeizureWait,
    ChallengeSent,
    ChallengeWait,
    HoldAckWait,
    Ringing,
    ConnectThrough,
    Active,

    // Teardown
    ReleaseBase,
    ReleaseMobile,
}

impl TransState {
    pub fn is_queued(self) -> bool {
        matches!(self, TransState::PageQueued | TransState::CallQueued)
    }

    /// States lived on a granted traffic channel
    pub fn on_traffic(self) -> bool {
        matches!(
            self,
            TransState::PageGranted
                | TransState::CallGranted
                | TransState::PageAckWait
                | TransState::SeizureWait
                | TransState::ChallengeSent
                | TransState::ChallengeWait
                | TransState::HoldAckWait
                | TransState::Ringing
                | TransState::ConnectThrough
                | TransState::Active
                | TransState::ReleaseBase
        )
    }
}

/// Set of states used as a search predicate, distinct from the state tag
/// itself so a single state and a set of states cannot be confused.
#[derive(Debug, Clone, Copy)]
pub struct StateSet(u32);

impl StateSet {
    pub const fn of(states: &[TransState]) -> StateSet {
        let mut mask = 0u32;
        let mut i = 0;
        while i < states.len() {
            mask |= 1 << (states[i] as u32);
            i += 1;
        }
        StateSet(mask)
    }

    pub const ANY: StateSet = StateSet(u32::MAX);

    pub fn contains(self, state: TransState) -> bool {
        self.0 & (1 << (state as u32)) != 0
    }
}

/// One call-control leg: a registration, a page, or a call.
/// Always linked to exactly one channel (`chan_idx`).
#[derive(Debug)]
pub struct Transaction {
    pub id: TransId,
    pub futln: Futln,
    /// Index of the owning channel; a transaction is never linked to two
    /// channels at once
    pub chan_idx: usize,
    /// Index of the control channel the leg was set up on; channel-assign
    /// telegrams are still broadcast there after the hand-off
    pub control_chan_idx: usize,
    pub state: TransState,
    /// Mobile-terminated leg
    pub terminating: bool,
    pub dialed: String,
    /// Retries of the current state's request
    pub retry: u8,
    /// Remaining transmissions of the current state's telegram
    pub repeat: u8,
    pub timer: SlotTimer,
    /// Reference into the external call-control layer, 0 if none.
    /// Must be released before the transaction is destroyed.
    pub call_ref: CallRef,
    pub release_cause: Option<Cause>,
    pub chip_card: bool,
    pub extended_band: bool,
    pub card_code: Option<u16>,
    pub challenge: Option<u64>,
    /// Alerting already reported to the network side
    pub alerted: bool,
    pub created: SlotTime,
    pub last_tx: Option<SlotTime>,
}

impl Transaction {
    pub fn new(id: TransId, futln: Futln, chan_idx: usize, state: TransState, now: SlotTime) -> Self {
        Self {
            id,
            futln,
            chan_idx,
            control_chan_idx: chan_idx,
            state,
            terminating: false,
            dialed: String::new(),
            retry: 0,
            repeat: 0,
            timer: SlotTimer::new(),
            call_ref: 0,
            release_cause: None,
            chip_card: false,
            extended_band: false,
            card_code: None,
            challenge: None,
            alerted: false,
            created: now,
            last_tx: None,
        }
    }
}

impl core::fmt::Display for Transaction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "trans #{} {} {:?}", self.id, self.futln, self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_set() {
        let queued = StateSet::of(&[TransState::PageQueued, TransState::CallQueued]);
        assert!(queued.contains(TransState::PageQueued));
        assert!(queued.contains(TransState::CallQueued));
        assert!(!queued.contains(TransState::Active));
        assert!(StateSet::ANY.contains(TransState::Active));
    }

    #[test]
    fn test_queued_predicate_matches_set() {
        for state in [TransState::PageQueued, TransState::CallQueued] {
            assert!(state.is_queued());
        }
        assert!(!TransState::PageDelay.is_queued());
    }
}
