use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

pub const CONFIG_ENV: &str = "FRONTIER_TAB_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read tab config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Input tuning switches shared by every tab in the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TabConfig {
    /// When off, pointer moves take the same path as buttons.
    pub coalesce_pointer_moves: bool,
    pub coalesce_wheel: bool,
    pub skip_repeated_keys: bool,
}

impl Default for TabConfig {
    fn default() -> Self {
        Self {
            coalesce_pointer_moves: true,
            coalesce_wheel: true,
            skip_repeated_keys: true,
        }
    }
}

impl TabConfig {
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        match config_path {
            Some(path) if path.exists() => {
                let contents = fs::read_to_string(path)?;
                Ok(serde_yaml::from_str(&contents)?)
            }
            _ => Ok(Self::default()),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(std::env::var(CONFIG_ENV).ok().map(PathBuf::from))
    }
}
