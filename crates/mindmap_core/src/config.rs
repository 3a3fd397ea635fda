//! Engine configuration.
//!
//! # Responsibility
//! - Load engine settings from JSON with defaults for missing keys.
//! - Validate settings before they reach the controller.
//!
//! # Invariants
//! - Unknown keys are rejected.
//! - A validated config always has `undo_levels > 0` and a supported level.

use crate::io::tree_writer::SerializeOptions;
use crate::logging::{default_log_level, normalize_level};
use crate::undo::engine::DEFAULT_UNDO_LEVELS;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;

/// Settings for one mode controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Maximum number of undo steps kept.
    pub undo_levels: usize,
    /// Whether saves include nodes hidden by the view filter.
    pub save_invisible_nodes: bool,
    /// Whether saves write `ID` only for link targets.
    pub save_only_intrinsic_ids: bool,
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            undo_levels: DEFAULT_UNDO_LEVELS,
            save_invisible_nodes: true,
            save_only_intrinsic_ids: false,
            log_level: default_log_level().to_string(),
        }
    }
}

impl EngineConfig {
    /// Parses and validates a JSON document.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.undo_levels == 0 {
            return Err(ConfigError::Invalid {
                field: "undo_levels",
                message: "must be greater than zero".to_string(),
            });
        }
        normalize_level(&self.log_level).map_err(|err| ConfigError::Invalid {
            field: "log_level",
            message: err.to_string(),
        })?;
        Ok(())
    }

    /// Serializer options used by whole-map saves.
    pub fn serialize_options(&self) -> SerializeOptions {
        SerializeOptions {
            write_invisible_nodes: self.save_invisible_nodes,
            write_children: true,
            write_only_intrinsic_ids: self.save_only_intrinsic_ids,
        }
    }
}

/// Configuration loading errors.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    Invalid {
        field: &'static str,
        message: String,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "failed to read config: {err}"),
            Self::Parse(err) => write!(f, "invalid config json: {err}"),
            Self::Invalid { field, message } => write!(f, "invalid config `{field}`: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Parse(err) => Some(err),
            Self::Invalid { .. } => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}
