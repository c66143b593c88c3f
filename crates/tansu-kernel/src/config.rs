//! Driver configuration.
//!
//! Loaded from TOML or built in code:
//!
//! ```toml
//! cache_computed_hashes = true
//! max_name_len = 255
//! scan_root_on_mount = false
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tansu_types::DEFAULT_MAX_NAME_LEN;
use thiserror::Error;

/// Error loading a config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Tunables for a [`Driver`](crate::Driver) instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Store hashes computed by the hash function on the entry, so later
    /// calls see `Hash::Known`. Off by default: each call computes.
    pub cache_computed_hashes: bool,

    /// Longest entry name accepted, in bytes.
    pub max_name_len: usize,

    /// Enumerate the root folder's children while mounting.
    pub scan_root_on_mount: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            cache_computed_hashes: false,
            max_name_len: DEFAULT_MAX_NAME_LEN,
            scan_root_on_mount: false,
        }
    }
}

impl DriverConfig {
    /// Parse a config from TOML text. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Load a config from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Set whether computed hashes are cached.
    pub fn with_cache_computed_hashes(mut self, enabled: bool) -> Self {
        self.cache_computed_hashes = enabled;
        self
    }

    /// Set the name length limit.
    pub fn with_max_name_len(mut self, len: usize) -> Self {
        self.max_name_len = len;
        self
    }

    /// Set whether the root is scanned at mount.
    pub fn with_scan_root_on_mount(mut self, enabled: bool) -> Self {
        self.scan_root_on_mount = enabled;
        self
    }
}
