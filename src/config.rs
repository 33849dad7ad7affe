//! Runner configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via ARBOR_CONFIG or --config)
//! 3. Environment variables

use arbor_core::EngineConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

const HISTORY_FILE_NAME: &str = ".arbor_history";

/// Runner configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Engine settings applied to every instance.
    pub engine: EngineConfig,
    /// Interactive shell settings.
    pub repl: ReplConfig,
}

impl Config {
    /// Loads configuration from `path` (or ARBOR_CONFIG), then applies
    /// environment variable overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match std::env::var("ARBOR_CONFIG") {
                Ok(path) => Self::from_file(&path)?,
                Err(_) => Self::default(),
            },
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(depth) = std::env::var("ARBOR_MAX_AUTO_DEPTH") {
            if let Ok(n) = depth.parse() {
                self.engine.max_auto_depth = n;
            }
        }
        self.repl.apply_env_overrides();
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.max_auto_depth == 0 {
            return Err(ConfigError::Validation(
                "engine.max_auto_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Ok(())
    }
}

/// Interactive shell configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplConfig {
    /// History file; defaults to `~/.arbor_history`.
    pub history_file: Option<PathBuf>,
    /// Whether to keep history between sessions.
    pub save_history: bool,
}

impl Default for ReplConfig {
    fn default() -> Self {
        Self {
            history_file: None,
            save_history: true,
        }
    }
}

impl ReplConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("ARBOR_HISTORY_FILE") {
            if path.is_empty() {
                self.save_history = false;
            } else {
                self.history_file = Some(PathBuf::from(path));
            }
        }
    }

    /// Resolved history path, falling back to the working directory when
    /// there is no home directory.
    pub fn history_path(&self) -> Option<PathBuf> {
        if !self.save_history {
            return None;
        }
        let path = self.history_file.clone().unwrap_or_else(|| {
            home::home_dir()
                .map(|home| home.join(HISTORY_FILE_NAME))
                .unwrap_or_else(|| PathBuf::from(HISTORY_FILE_NAME))
        });
        Some(path)
    }
}

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {1}", .0.display())]
    Io(PathBuf, std::io::Error),

    #[error("failed to parse config file '{}': {1}", .0.display())]
    Parse(PathBuf, String),

    #[error("configuration validation failed: {0}")]
    Validation(String),
}
