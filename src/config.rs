//! Configuration for rawline.
//!
//! Settings are read from `~/.rawline/config.toml`; every key is optional:
//!
//! ```toml
//! # Terminal type (defaults to $TERM)
//! term = "xterm-256color"
//!
//! # Prompt tag shown as "<tag>.<n>> "
//! prompt_tag = "input"
//!
//! # Idle timeout between "waiting for input" notices
//! poll_timeout_ms = 1000
//!
//! # Set to false to keep the log region quiet
//! idle_log = true
//!
//! # Log filter for ~/.rawline/rawline.log (overridden by RAWLINE_LOG)
//! log_level = "info"
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Directory under the home directory holding config and log files
const APP_DIR: &str = ".rawline";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Main configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Terminal type; `$TERM` when unset
    pub term: Option<String>,
    /// Prompt tag
    pub prompt_tag: String,
    /// Idle timeout in milliseconds
    pub poll_timeout_ms: u64,
    /// Log idle notices into the scroll region
    pub idle_log: bool,
    /// tracing filter directive
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            term: None,
            prompt_tag: "input".to_string(),
            poll_timeout_ms: 1000,
            idle_log: true,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// A missing file is not an error.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::get_config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn poll_timeout(&self) -> Duration {
        // A zero timeout would turn the idle log into a busy loop.
        Duration::from_millis(self.poll_timeout_ms.max(1))
    }

    /// Get config file path
    fn get_config_path() -> Option<PathBuf> {
        app_dir().map(|dir| dir.join("config.toml"))
    }

    /// Get log file path
    pub fn get_log_path() -> PathBuf {
        app_dir()
            .map(|dir| dir.join("rawline.log"))
            .unwrap_or_else(|| PathBuf::from("rawline.log"))
    }
}

fn app_dir() -> Option<PathBuf> {
    home_dir().map(|home| home.join(APP_DIR))
}

/// Get home directory
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}
