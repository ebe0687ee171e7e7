use cnetz_config::ChannelRole;
use cnetz_core::{ChanNr, SlotTime};

use crate::cc::transaction::TransId;

/// Slots between scheduling a transmission-mode switch and it taking
/// effect; never applied instantaneously, to respect the radio turnaround
pub const MODE_SWITCH_AHEAD_SLOTS: i64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Null,
    Idle,
    Busy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxMode {
    Off,
    /// Control broadcast: system information and call-setup signaling
    ControlBroadcast,
    /// Traffic with concentrated signaling (call setup on the channel)
    TrafficConcentrated,
    /// Traffic with signaling distributed between voice
    TrafficDistributed,
}

/// One radio-frequency transceiver
pub struct Channel {
    pub nr: ChanNr,
    pub role: ChannelRole,
    pub state: ChannelState,
    pub mode: TxMode,
    /// Slot counter 0..31, follows the super-frame
    pub slot_counter: u8,
    /// Mode switch scheduled for a future slot
    pending_mode: Option<(SlotTime, TxMode)>,
    /// Reserved for a granted traffic leg until returned to its resting
    /// mode; blocks further grants during the hand-off window
    pub reserved: bool,
    /// Telegrams of this channel are transmitted with inverted polarity
    pub inverted_polarity: bool,
    /// The last received frame arrived inverted (auto-polarity)
    pub rx_inverted: bool,
    /// Transactions owned by this channel
    trans: Vec<TransId>,
}

impl Channel {
    pub fn new(nr: ChanNr, role: ChannelRole, inverted_polarity: bool) -> Self {
        Self {
            nr,
            role,
            state: ChannelState::Null,
            mode: TxMode::Off,
            slot_counter: 0,
            pending_mode: None,
            reserved: false,
            inverted_polarity,
            rx_inverted: false,
            trans: Vec::new(),
        }
    }

    /// Bring the channel up at startup
    pub fn activate(&mut self) {
        self.state = ChannelState::Idle;
        self.mode = if self.is_control_capable() {
            TxMode::ControlBroadcast
        } else {
            TxMode::Off
        };
    }

    pub fn is_control_capable(&self) -> bool {
        matches!(self.role, ChannelRole::Control | ChannelRole::Combined)
    }

    pub fn is_traffic_capable(&self) -> bool {
        matches!(self.role, ChannelRole::Traffic | ChannelRole::Combined)
    }

    pub fn in_control_mode(&self) -> bool {
        self.mode == TxMode::ControlBroadcast
    }

    pub fn in_traffic_mode(&self) -> bool {
        matches!(self.mode, TxMode::TrafficConcentrated | TxMode::TrafficDistributed)
    }

    /// Schedule a transmission-mode switch a fixed number of slots ahead
    pub fn schedule_mode(&mut self, now: SlotTime, mode: TxMode) {
        self.pending_mode = Some((now.add_slots(MODE_SWITCH_AHEAD_SLOTS), mode));
    }

    /// Advance the slot counter and apply a due mode switch.
    /// Returns the new mode when one was applied.
    pub fn tick(&mut self, now: SlotTime) -> Option<TxMode> {
        self.slot_counter = now.slot;
        if let Some((at, mode)) = self.pending_mode {
            if now.diff(at) >= 0 {
                tracing::debug!("chan {}: mode {:?} -> {:?}", self.nr, self.mode, mode);
                self.mode = mode;
                self.pending_mode = None;
                return Some(mode);
            }
        }
        None
    }

    /// Link a transaction. A channel is BUSY iff it owns at least one;
    /// a traffic-only channel carries at most one.
    pub fn link(&mut self, id: TransId) {
        if self.role == ChannelRole::Traffic {
            assert!(self.trans.is_empty(), "traffic channel {} already owns a transaction", self.nr);
        }
        debug_assert!(!self.trans.contains(&id));
        self.trans.push(id);
        self.state = ChannelState::Busy;
    }

    pub fn unlink(&mut self, id: TransId) {
        self.trans.retain(|&t| t != id);
        if self.trans.is_empty() {
            self.state = ChannelState::Idle;
        }
    }

    pub fn linked(&self) -> &[TransId] {
        &self.trans
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_iff_linked() {
        let mut chan = Channel::new(287, ChannelRole::Traffic, false);
        chan.activate();
        assert_eq!(chan.state, ChannelState::Idle);
        chan.link(1);
        assert_eq!(chan.state, ChannelState::Busy);
        chan.unlink(1);
        assert_eq!(chan.state, ChannelState::Idle);
    }

    #[test]
    #[should_panic(expected = "already owns a transaction")]
    fn test_traffic_channel_exclusivity() {
        let mut chan = Channel::new(287, ChannelRole::Traffic, false);
        chan.activate();
        chan.link(1);
        chan.link(2);
    }

    #[test]
    fn test_mode_switch_is_deferred() {
        let mut chan = Channel::new(412, ChannelRole::Combined, false);
        chan.activate();
        assert_eq!(chan.mode, TxMode::ControlBroadcast);

        let now = SlotTime::default();
        chan.schedule_mode(now, TxMode::TrafficConcentrated);
        // not applied immediately, nor one slot later
        assert_eq!(chan.tick(now), None);
        assert_eq!(chan.tick(now.add_slots(1)), None);
        assert_eq!(chan.mode, TxMode::ControlBroadcast);
        // applied exactly MODE_SWITCH_AHEAD_SLOTS later
        assert_eq!(
            chan.tick(now.add_slots(MODE_SWITCH_AHEAD_SLOTS)),
            Some(TxMode::TrafficConcentrated)
        );
        assert_eq!(chan.mode, TxMode::TrafficConcentrated);
    }

    #[test]
    fn test_control_channel_hosts_many() {
        let mut chan = Channel::new(131, ChannelRole::Control, false);
        chan.activate();
        chan.link(1);
        chan.link(2);
        chan.link(3);
        assert_eq!(chan.linked().len(), 3);
        assert_eq!(chan.state, ChannelState::Busy);
    }
}
