use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::Deserialize;
use toml::Value;

use super::stack_config::{
    CfgCellInfo, CfgChannel, CfgPhy, CfgTimers, ChannelRole, FskDetector, SharedConfig,
    StackConfig, StackState,
};

/// Build `SharedConfig` from a TOML configuration string
pub fn from_toml_str(toml_str: &str) -> Result<SharedConfig, Box<dyn std::error::Error>> {
    let root: TomlConfigRoot = toml::from_str(toml_str)?;

    // Various sanity checks
    let expected_config_version = "0.3";
    if !root.config_version.eq(expected_config_version) {
        return Err(format!(
            "Unrecognized config_version: {}, expect {}",
            root.config_version, expected_config_version
        )
        .into());
    }
    if !root.extra.is_empty() {
        return Err(format!("Unrecognized top-level fields: {:?}", sorted_keys(&root.extra)).into());
    }
    if let Some(ref phy) = root.phy {
        if !phy.extra.is_empty() {
            return Err(format!("Unrecognized fields: phy::{:?}", sorted_keys(&phy.extra)).into());
        }
    }
    if let Some(ref ci) = root.cell_info {
        if !ci.extra.is_empty() {
            return Err(format!("Unrecognized fields in cell_info: {:?}", sorted_keys(&ci.extra)).into());
        }
    }
    if let Some(ref t) = root.timers {
        if !t.extra.is_empty() {
            return Err(format!("Unrecognized fields in timers: {:?}", sorted_keys(&t.extra)).into());
        }
    }
    for ch in &root.channel {
        if !ch.extra.is_empty() {
            return Err(format!("Unrecognized fields in channel: {:?}", sorted_keys(&ch.extra)).into());
        }
    }

    // Build config from required and optional values
    let mut cfg = StackConfig {
        debug_log: root.debug_log,
        phy: CfgPhy::default(),
        cell: CfgCellInfo::default(),
        channels: Vec::new(),
        timers: CfgTimers::default(),
    };

    if let Some(phy) = root.phy {
        apply_phy_patch(&mut cfg.phy, phy);
    }
    if let Some(ci) = root.cell_info {
        apply_cell_info_patch(&mut cfg.cell, ci);
    }
    if let Some(t) = root.timers {
        apply_timers_patch(&mut cfg.timers, t);
    }
    for ch in root.channel {
        cfg.channels.push(CfgChannel { nr: ch.nr, role: ch.role });
    }

    Ok(SharedConfig::from_parts(cfg, StackState::default()))
}

/// Build `SharedConfig` from any reader.
pub fn from_reader<R: Read>(mut reader: R) -> Result<SharedConfig, Box<dyn std::error::Error>> {
    let mut contents = String::new();
    reader.read_to_string(&mut contents)?;
    from_toml_str(&contents)
}

/// Build `SharedConfig` from a TOML configuration file
pub fn from_file<P: AsRef<Path>>(path: P) -> Result<SharedConfig, Box<dyn std::error::Error>> {
    let file = File::open(path)?;
    from_reader(BufReader::new(file))
}

fn sorted_keys(map: &HashMap<String, Value>) -> Vec<&String> {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    keys
}

fn apply_phy_patch(cfg: &mut CfgPhy, dto: CfgPhyDto) {
    if let Some(v) = dto.sample_rate {
        cfg.sample_rate = v;
    }
    if let Some(v) = dto.detector {
        cfg.detector = v;
    }
}

fn apply_cell_info_patch(cfg: &mut CfgCellInfo, dto: CfgCellInfoDto) {
    if let Some(v) = dto.cell_code {
        cfg.cell_code = v;
    }
    if let Some(v) = dto.inverted_polarity {
        cfg.inverted_polarity = v;
    }
    if let Some(v) = dto.queueing {
        cfg.queueing = v;
    }
    if let Some(v) = dto.queue_size {
        cfg.queue_size = v;
    }
    if let Some(v) = dto.auth {
        cfg.auth = v;
    }
    if let Some(v) = dto.extended_band_start {
        cfg.extended_band_start = v;
    }
}

fn apply_timers_patch(cfg: &mut CfgTimers, dto: CfgTimersDto) {
    if let Some(v) = dto.probe_interval_s {
        cfg.probe_interval_s = v;
    }
    if let Some(v) = dto.probe_retry_s {
        cfg.probe_retry_s = v;
    }
    if let Some(v) = dto.probe_max_retries {
        cfg.probe_max_retries = v;
    }
    if let Some(v) = dto.queue_timeout_s {
        cfg.queue_timeout_s = v;
    }
    if let Some(v) = dto.dial_timeout_s {
        cfg.dial_timeout_s = v;
    }
    if let Some(v) = dto.seizure_timeout_s {
        cfg.seizure_timeout_s = v;
    }
    if let Some(v) = dto.seizure_max_repeats {
        cfg.seizure_max_repeats = v;
    }
    if let Some(v) = dto.auth_timeout_s {
        cfg.auth_timeout_s = v;
    }
    if let Some(v) = dto.hold_timeout_s {
        cfg.hold_timeout_s = v;
    }
    if let Some(v) = dto.hold_max_retries {
        cfg.hold_max_retries = v;
    }
    if let Some(v) = dto.ring_timeout_s {
        cfg.ring_timeout_s = v;
    }
    if let Some(v) = dto.release_repeats {
        cfg.release_repeats = v;
    }
    if let Some(v) = dto.hold_interval_s {
        cfg.hold_interval_s = v;
    }
}

#[derive(Debug, Deserialize)]
struct TomlConfigRoot {
    config_version: String,
    debug_log: Option<String>,
    phy: Option<CfgPhyDto>,
    cell_info: Option<CfgCellInfoDto>,
    timers: Option<CfgTimersDto>,
    #[serde(default)]
    channel: Vec<CfgChannelDto>,
    #[serde(flatten)]
    extra: HashMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct CfgPhyDto {
    sample_rate: Option<u32>,
    detector: Option<FskDetector>,
    #[serde(flatten)]
    extra: HashMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct CfgCellInfoDto {
    cell_code: Option<u8>,
    inverted_polarity: Option<bool>,
    queueing: Option<bool>,
    queue_size: Option<usize>,
    auth: Option<bool>,
    extended_band_start: Option<u16>,
    #[serde(flatten)]
    extra: HashMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct CfgTimersDto {
    probe_interval_s: Option<f64>,
    probe_retry_s: Option<f64>,
    probe_max_retries: Option<u8>,
    queue_timeout_s: Option<f64>,
    dial_timeout_s: Option<f64>,
    seizure_timeout_s: Option<f64>,
    seizure_max_repeats: Option<u8>,
    auth_timeout_s: Option<f64>,
    hold_timeout_s: Option<f64>,
    hold_max_retries: Option<u8>,
    ring_timeout_s: Option<f64>,
    release_repeats: Option<u8>,
    hold_interval_s: Option<f64>,
    #[serde(flatten)]
    extra: HashMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct CfgChannelDto {
    nr: u16,
    role: ChannelRole,
    #[serde(flatten)]
    extra: HashMap<String, Value>,
}
