//! Engine configuration
//!
//! Every field has a default, so an empty file (or no file at all) gives a
//! working engine. A config file looks like:
//!
//! ```toml
//! opt_level = "speed"
//! verify = true
//! demo_symbols = false
//! teardown = "release"
//! log_filter = "ember_core=debug"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when loading a configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Optimization level handed to the code generator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptLevel {
    /// No optimization, fastest compile
    #[default]
    None,
    /// Optimize for speed
    Speed,
    /// Optimize for speed and size
    SpeedAndSize,
}

impl OptLevel {
    /// Value of Cranelift's `opt_level` setting
    #[must_use]
    pub const fn as_setting(self) -> &'static str {
        match self {
            OptLevel::None => "none",
            OptLevel::Speed => "speed",
            OptLevel::SpeedAndSize => "speed_and_size",
        }
    }
}

/// What happens to JIT code memory when the engine is dropped
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Teardown {
    /// Free code memory; pointers handed out become invalid
    #[default]
    Release,
    /// Keep code memory mapped for the life of the process
    Leak,
}

/// Engine settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub opt_level: OptLevel,
    /// Run the IR verifier on every finished function
    pub verify: bool,
    /// Register `debug_add` at startup
    pub demo_symbols: bool,
    pub teardown: Teardown,
    /// `tracing` filter directive used by [`crate::init_tracing`]
    pub log_filter: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            opt_level: OptLevel::None,
            verify: true,
            demo_symbols: true,
            teardown: Teardown::Release,
            log_filter: "info".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load a configuration from a TOML file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse a configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Serialize back to TOML
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
