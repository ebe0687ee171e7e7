pub mod stack_config;
pub mod toml_config;

pub use stack_config::{
    CfgCellInfo, CfgChannel, CfgPhy, CfgTimers, ChannelRole, FskDetector, SharedConfig,
    StackConfig, StackState,
};
