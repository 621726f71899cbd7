//! Configuration loading and management

mod io;
mod settings;

pub use io::Provisioned;
pub use settings::{AchievementSettings, EngineSettings, PointsSettings, StoreSettings};

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Main configuration structure (`~/.questline/config.toml`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub points: PointsSettings,

    #[serde(default)]
    pub store: StoreSettings,

    #[serde(default)]
    pub engine: EngineSettings,

    #[serde(default)]
    pub achievements: AchievementSettings,
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load from `path`, falling back to defaults when the file does not exist
    pub fn from_file_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }
}
