//! Engine settings

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use sop_monitor_core::SpeakerRole;

use crate::ConfigError;

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Compliance engine configuration
    #[serde(default)]
    pub engine: EngineConfig,

    /// SOP rule set path (built-in rules when absent)
    #[serde(default)]
    pub sop_file: Option<String>,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    /// Create default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.greeting_window == 0 {
            return Err(ConfigError::InvalidValue {
                field: "engine.greeting_window".to_string(),
                message: "Greeting window must cover at least one agent utterance".to_string(),
            });
        }

        if self.engine.closing_window == 0 {
            return Err(ConfigError::InvalidValue {
                field: "engine.closing_window".to_string(),
                message: "Closing window must cover at least one utterance".to_string(),
            });
        }

        if self.engine.event_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "engine.event_capacity".to_string(),
                message: "Event channel capacity must be positive".to_string(),
            });
        }

        if self.engine.ordering.mode == OrderingMode::Buffered
            && self.engine.ordering.reorder_window_ms == 0
        {
            tracing::warn!("Buffered ordering with a zero reorder window behaves like strict mode");
        }

        Ok(())
    }
}

/// Compliance engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Number of opening agent utterances in which the greeting must happen
    #[serde(default = "default_greeting_window")]
    pub greeting_window: usize,

    /// Number of trailing utterances evaluated for the closing
    #[serde(default = "default_closing_window")]
    pub closing_window: usize,

    /// Ingestion ordering policy
    #[serde(default)]
    pub ordering: OrderingConfig,

    /// Diarization label to speaker role
    #[serde(default = "default_speaker_labels")]
    pub speaker_labels: BTreeMap<String, SpeakerRole>,

    /// Capacity of the event broadcast channel
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_greeting_window() -> usize {
    2
}
fn default_closing_window() -> usize {
    3
}
fn default_event_capacity() -> usize {
    256
}

fn default_speaker_labels() -> BTreeMap<String, SpeakerRole> {
    BTreeMap::from([
        ("Speaker 1".to_string(), SpeakerRole::Customer),
        ("Speaker 2".to_string(), SpeakerRole::Agent),
    ])
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            greeting_window: default_greeting_window(),
            closing_window: default_closing_window(),
            ordering: OrderingConfig::default(),
            speaker_labels: default_speaker_labels(),
            event_capacity: default_event_capacity(),
        }
    }
}

/// How ingestion treats timestamps that go backwards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderingMode {
    /// Reject utterances older than the last ingested one (beyond the tolerance)
    #[default]
    Strict,
    /// Hold utterances in a reorder window before releasing them in timestamp order
    Buffered,
}

/// Ordering policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderingConfig {
    #[serde(default)]
    pub mode: OrderingMode,

    /// Allowed backwards skew in strict mode
    #[serde(default)]
    pub tolerance_ms: u64,

    /// Hold time for buffered mode
    #[serde(default = "default_reorder_window_ms")]
    pub reorder_window_ms: u64,
}

fn default_reorder_window_ms() -> u64 {
    1500
}

impl Default for OrderingConfig {
    fn default() -> Self {
        Self {
            mode: OrderingMode::Strict,
            tolerance_ms: 0,
            reorder_window_ms: default_reorder_window_ms(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub log_json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

/// Load settings from files and environment
///
/// Priority (highest to lowest):
/// 1. Environment variables (SOP_MONITOR__ prefix)
/// 2. config/{env}.{toml,yaml,json} (if env specified)
/// 3. config/default.{toml,yaml,json}
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder = builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("SOP_MONITOR")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}
