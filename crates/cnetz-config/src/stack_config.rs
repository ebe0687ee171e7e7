use serde::Deserialize;
use std::sync::{Arc, RwLock};

use cnetz_core::ChanNr;

/// Role a transceiver plays in the cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ChannelRole {
    /// Control channel: system broadcast and call-setup signaling only
    Control,
    /// Traffic channel: voice plus in-call signaling for one call
    Traffic,
    /// Combined control+traffic, a degraded last-resort mode
    Combined,
}

/// Transition detector used by the bit synchronizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum FskDetector {
    /// Classify by maximum inter-sample slope; robust against DC offset,
    /// use for input taken from an analog radio
    SlopeMax,
    /// Classify by zero crossing; use for direct baseband/SDR input
    ZeroCrossing,
}

/// One configured transceiver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CfgChannel {
    pub nr: ChanNr,
    pub role: ChannelRole,
}

#[derive(Debug, Clone)]
pub struct CfgPhy {
    /// Input/output sample rate of the embedding audio layer
    pub sample_rate: u32,
    pub detector: FskDetector,
}

impl Default for CfgPhy {
    fn default() -> Self {
        Self { sample_rate: 48000, detector: FskDetector::SlopeMax }
    }
}

#[derive(Debug, Clone)]
pub struct CfgCellInfo {
    /// 5-bit cell code broadcast in the IdleSignal and echoed by uplink
    /// random-access telegrams
    pub cell_code: u8,
    /// Transmit telegrams with inverted polarity
    pub inverted_polarity: bool,
    /// Queue channel requests when no traffic channel is free
    pub queueing: bool,
    /// Maximum number of queued transactions
    pub queue_size: usize,
    /// Run challenge/response authentication after channel seizure
    pub auth: bool,
    /// Channels at or above this number belong to the extended frequency
    /// range and are withheld from mobiles that do not declare support
    pub extended_band_start: ChanNr,
}

impl Default for CfgCellInfo {
    fn default() -> Self {
        Self {
            cell_code: 0,
            inverted_polarity: false,
            queueing: true,
            queue_size: 8,
            auth: false,
            extended_band_start: 1000,
        }
    }
}

/// Timer and retry settings, in seconds / attempt counts.
/// Converted to slot counts by the call-control layer.
#[derive(Debug, Clone)]
pub struct CfgTimers {
    /// Interval between registry keep-alive probes
    pub probe_interval_s: f64,
    /// Shortened retry interval after a missed probe (ceiling)
    pub probe_retry_s: f64,
    /// Probes missed in a row before the subscriber is evicted
    pub probe_max_retries: u8,
    /// Maximum time a transaction may sit in the channel queue
    pub queue_timeout_s: f64,
    /// Time to wait for dialed digits after DialInvite
    pub dial_timeout_s: f64,
    /// Time to wait for SeizureConfirm on a fresh traffic channel
    pub seizure_timeout_s: f64,
    pub seizure_max_repeats: u8,
    /// Time to wait for an AuthResponse
    pub auth_timeout_s: f64,
    /// ConnectionHold round-trip timeout
    pub hold_timeout_s: f64,
    pub hold_max_retries: u8,
    /// How long the called subscriber may ring
    pub ring_timeout_s: f64,
    /// Times ReleaseBase is repeated without a quittance
    pub release_repeats: u8,
    /// Interval between distributed ConnectionHold exchanges during a call
    pub hold_interval_s: f64,
}

impl Default for CfgTimers {
    fn default() -> Self {
        Self {
            probe_interval_s: 600.0,
            probe_retry_s: 60.0,
            probe_max_retries: 3,
            queue_timeout_s: 8.0,
            dial_timeout_s: 4.0,
            seizure_timeout_s: 1.5,
            seizure_max_repeats: 8,
            auth_timeout_s: 2.0,
            hold_timeout_s: 3.0,
            hold_max_retries: 4,
            ring_timeout_s: 60.0,
            release_repeats: 3,
            hold_interval_s: 12.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StackConfig {
    pub debug_log: Option<String>,
    pub phy: CfgPhy,
    pub cell: CfgCellInfo,
    pub channels: Vec<CfgChannel>,
    pub timers: CfgTimers,
}

impl StackConfig {
    pub fn new(cell_code: u8, channels: Vec<CfgChannel>) -> Self {
        StackConfig {
            debug_log: None,
            phy: CfgPhy::default(),
            cell: CfgCellInfo { cell_code, ..CfgCellInfo::default() },
            channels,
            timers: CfgTimers::default(),
        }
    }

    /// Validate that all required configuration fields are properly set.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.cell.cell_code >= 32 {
            return Err("cell_code is a 5-bit field");
        }
        if self.channels.is_empty() {
            return Err("at least one channel must be configured");
        }
        if !self
            .channels
            .iter()
            .any(|c| matches!(c.role, ChannelRole::Control | ChannelRole::Combined))
        {
            return Err("at least one control-capable channel must be configured");
        }
        for (i, a) in self.channels.iter().enumerate() {
            if a.nr >= 1024 {
                return Err("channel number is a 10-bit field");
            }
            if self.channels[i + 1..].iter().any(|b| b.nr == a.nr) {
                return Err("duplicate channel number");
            }
        }
        if self.timers.probe_max_retries == 0 {
            return Err("probe_max_retries must be at least 1");
        }
        if (self.phy.sample_rate as f64) < 2.0 * cnetz_core::timebase::BIT_RATE {
            return Err("sample_rate must be at least twice the bit rate");
        }
        Ok(())
    }
}

/// Mutable, stack-editable runtime state (lock-protected).
#[derive(Debug, Clone, Default)]
pub struct StackState {
    /// Transactions currently waiting in the channel queue
    pub queue_len: usize,
    /// Subscribers currently held in the registry
    pub attached: usize,
}

/// Global shared configuration: immutable config + mutable state.
#[derive(Clone)]
pub struct SharedConfig {
    /// Read-only configuration (immutable after construction).
    cfg: Arc<StackConfig>,
    /// Mutable state guarded with RwLock (written by the stack, read by others).
    state: Arc<RwLock<StackState>>,
}

impl SharedConfig {
    pub fn from_config(cfg: StackConfig) -> Self {
        Self::from_parts(cfg, StackState::default())
    }

    pub fn from_parts(cfg: StackConfig, state: StackState) -> Self {
        // Check config for validity before returning the SharedConfig object
        if let Err(e) = cfg.validate() {
            panic!("Invalid stack configuration: {}", e);
        }

        Self {
            cfg: Arc::new(cfg),
            state: Arc::new(RwLock::new(state)),
        }
    }

    /// Access immutable config.
    pub fn config(&self) -> Arc<StackConfig> {
        Arc::clone(&self.cfg)
    }

    /// Read guard for mutable state.
    pub fn state_read(&self) -> std::sync::RwLockReadGuard<'_, StackState> {
        self.state.read().expect("StackState RwLock blocked")
    }

    /// Write guard for mutable state.
    pub fn state_write(&self) -> std::sync::RwLockWriteGuard<'_, StackState> {
        self.state.write().expect("StackState RwLock blocked")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_channel_config() -> StackConfig {
        StackConfig::new(
            7,
            vec![
                CfgChannel { nr: 131, role: ChannelRole::Control },
                CfgChannel { nr: 287, role: ChannelRole::Traffic },
            ],
        )
    }

    #[test]
    fn test_validate_ok() {
        assert!(two_channel_config().validate().is_ok());
    }

    #[test]
    fn test_validate_requires_control() {
        let mut cfg = two_channel_config();
        cfg.channels[0].role = ChannelRole::Traffic;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_duplicate_channels() {
        let mut cfg = two_channel_config();
        cfg.channels[1].nr = 131;
        assert!(cfg.validate().is_err());
    }
}
