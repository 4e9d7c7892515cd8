//! Configuration management for the SOP compliance monitor
//!
//! Two documents drive a session:
//! - The SOP rule set (phase criteria, prohibited phrases, required-information
//!   patterns), loaded from TOML, JSON or a legacy markdown outline
//! - Engine settings (windows, ordering policy, speaker labels, observability),
//!   loaded from `config/` files and `SOP_MONITOR__*` environment variables

pub mod settings;
pub mod sop;

pub use settings::{
    load_settings, EngineConfig, ObservabilityConfig, OrderingConfig, OrderingMode, Settings,
};
pub use sop::{
    default_sop, load_sop, parse_outline, CriterionRule, InfoRule, PhaseRules, SopRules,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("SOP rule set is missing a definition for phase '{0}'")]
    MissingPhase(String),

    #[error("Invalid pattern in {rule}: {message}")]
    InvalidPattern { rule: String, message: String },

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Environment error: {0}")]
    Environment(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl From<ConfigError> for sop_monitor_core::Error {
    fn from(err: ConfigError) -> Self {
        sop_monitor_core::Error::Configuration(err.to_string())
    }
}
