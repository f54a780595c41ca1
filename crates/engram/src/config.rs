//! Configuration for the Engram store
//!
//! Loaded from TOML; every field has a default so a missing or partial
//! file still yields a working configuration.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{EngramError, Result};

/// Main configuration structure for Engram
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Durable store configuration
    #[serde(default)]
    pub storage: StorageConfig,
    /// Tiered distillation configuration
    #[serde(default)]
    pub distiller: DistillerSettings,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            EngramError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        toml::from_str(&raw)
            .map_err(|e| EngramError::Config(format!("cannot parse {}: {e}", path.display())))
    }
}

/// Durable store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Base directory for all record and unit files
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".engram"))
        .unwrap_or_else(|| PathBuf::from(".engram"))
}

/// Tiered distillation configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DistillerSettings {
    /// Units consumed per compaction batch at every tier
    #[serde(default = "default_fan_in")]
    pub fan_in: usize,
}

impl Default for DistillerSettings {
    fn default() -> Self {
        Self {
            fan_in: default_fan_in(),
        }
    }
}

fn default_fan_in() -> usize {
    8
}
