pub mod macros;

pub mod ccp_config;
pub mod groups;

mod config_value;
pub use config_value::ParsableConfigValue;

pub use crate::ccp_config::{CcpConfig, ccp_config};

pub type EngineConfig = groups::engine::ConfigValues;
pub type HttpConfig = groups::http::ConfigValues;
