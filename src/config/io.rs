//! Config file locations and locked writes

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;

use super::Config;

const HEADER: &str = "# questline configuration\n# Missing keys fall back to the built-in defaults.\n\n";

/// What [`Config::provision`] found at the path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioned {
    /// Defaults were written
    Created,
    /// An existing file was loaded as is
    Existing,
}

impl Config {
    /// Get the global config directory path (~/.questline/)
    pub fn global_config_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".questline")
    }

    /// Get the global config file path (~/.questline/config.toml)
    pub fn global_config_path() -> PathBuf {
        Self::global_config_dir().join("config.toml")
    }

    /// Write the defaults to `path` unless a config is already there.
    /// `force` overwrites an existing file.
    ///
    /// The existence check and the write happen under one lock, so concurrent
    /// `init` runs end up sharing a single file.
    pub fn provision(path: &Path, force: bool) -> Result<(Self, Provisioned)> {
        let _lock = ConfigLock::acquire(path)?;
        if path.exists() && !force {
            return Ok((Self::from_file(path)?, Provisioned::Existing));
        }
        let config = Self::default();
        config.write_locked(path)?;
        Ok((config, Provisioned::Created))
    }

    /// Save configuration to a file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let _lock = ConfigLock::acquire(path)?;
        self.write_locked(path)
    }

    /// Replace `path` through a temp file. Caller holds the [`ConfigLock`].
    fn write_locked(&self, path: &Path) -> Result<()> {
        let body = toml::to_string_pretty(self).context("Failed to serialize config")?;

        let temp_path = path.with_extension("toml.tmp");
        let mut temp = File::create(&temp_path)
            .with_context(|| format!("Failed to create temp file: {}", temp_path.display()))?;
        temp.write_all(HEADER.as_bytes())
            .and_then(|_| temp.write_all(body.as_bytes()))
            .and_then(|_| temp.sync_all())
            .with_context(|| format!("Failed to write config: {}", temp_path.display()))?;
        drop(temp);

        std::fs::rename(&temp_path, path)
            .with_context(|| format!("Failed to replace config file: {}", path.display()))
    }
}

/// Exclusive advisory lock on `<config>.lock`, held until dropped
struct ConfigLock {
    _file: File,
}

impl ConfigLock {
    fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let lock_path = path.with_extension("toml.lock");
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .with_context(|| format!("Failed to open lock file: {}", lock_path.display()))?;
        file.lock_exclusive()
            .with_context(|| format!("Failed to lock config: {}", lock_path.display()))?;
        Ok(Self { _file: file })
    }
}
