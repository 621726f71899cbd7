//! Settings sections

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::Config;

/// Ledger settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointsSettings {
    /// Welcome grant recorded as an `initial` transaction
    #[serde(default = "default_initial_bonus")]
    pub initial_bonus: i64,
}

impl Default for PointsSettings {
    fn default() -> Self {
        Self {
            initial_bonus: default_initial_bonus(),
        }
    }
}

fn default_initial_bonus() -> i64 {
    50
}

/// Document store settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSettings {
    /// SQLite database path. Defaults to `~/.questline/store.db`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl StoreSettings {
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| Config::global_config_dir().join("store.db"))
    }
}

/// Engine tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Attempts for a conditional write before giving up on a contended document
    #[serde(default = "default_max_write_retries")]
    pub max_write_retries: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_write_retries: default_max_write_retries(),
        }
    }
}

fn default_max_write_retries() -> u32 {
    8
}

/// Achievement registry settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AchievementSettings {
    /// Collectibles unlocked for the user on first-run seeding
    #[serde(default = "default_starter")]
    pub starter: Vec<String>,
}

impl Default for AchievementSettings {
    fn default() -> Self {
        Self {
            starter: default_starter(),
        }
    }
}

fn default_starter() -> Vec<String> {
    ["AL", "DE", "FR", "IT", "ES"]
        .into_iter()
        .map(String::from)
        .collect()
}
