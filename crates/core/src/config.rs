use std::path::{Path, PathBuf};

use fiber_trace_protocol::TREE_CHANGES_CHANNEL;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Bridge behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct BridgeConfig {
    /// Channel every decoded batch is published on.
    pub channel: String,
    /// Ask attached renderers to record render durations.
    pub profiling: bool,
    /// Per-renderer cap on notifications held while attaching.
    pub max_buffered_notifications: usize,
    /// Keep published messages so `resync` can replay them.
    pub history: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            channel: TREE_CHANGES_CHANNEL.to_string(),
            profiling: true,
            max_buffered_notifications: 1024,
            history: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// How many trailing commits `CommitStore::recent` returns.
    pub commit_window: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { commit_window: 20 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bridge: BridgeConfig,
    pub store: StoreConfig,
    /// `tracing` filter directive, e.g. `"info"` or `"fiber_trace_core=debug"`.
    pub log_level: Option<String>,
}

impl Config {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(input)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&input)
    }
}
