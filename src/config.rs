//! Configuration loading and defaults.

use anyhow::Result;
use serde::Deserialize;
use std::path::Path;

/// Runtime configuration for RustIndex.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Buffer pool size (number of page frames). Default 1024.
    pub buffer_pool_size: usize,

    /// Data directory (heap relations and index files). Default ".".
    pub data_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            buffer_pool_size: 1024,
            data_dir: ".".to_string(),
        }
    }
}

impl Config {
    /// Load config from a TOML file. Defaults to `Config::default()`.
    /// Empty file returns default config.
    pub fn from_path(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        if s.trim().is_empty() {
            return Ok(Self::default());
        }
        let c: Config = toml::from_str(&s)?;
        c.validate()?;
        Ok(c)
    }

    /// Use default config. Convenience for tests and minimal setups.
    pub fn default_config() -> Self {
        Self::default()
    }

    fn validate(&self) -> Result<()> {
        // An insert holds a root-to-leaf path plus both split halves pinned
        // at once; a handful of frames is the floor for any usable pool.
        if self.buffer_pool_size < 8 {
            anyhow::bail!("buffer_pool_size must be at least 8");
        }
        Ok(())
    }
}
