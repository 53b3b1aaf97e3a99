//! Configuration file support for conntracker
//!
//! Loads and validates configuration from a TOML file.
//! Default location: /etc/conntracker/conntracker.conf

use crate::error::{ConntrackerError, Result};
use crate::table::FootprintMatch;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::level_filters::LevelFilter;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/conntracker/conntracker.conf";

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Dump output configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// File the flow tables are dumped to
    #[serde(default = "default_logfile")]
    pub logfile: PathBuf,

    /// Append Prometheus text exposition after the dump
    #[serde(default)]
    pub metrics: bool,
}

/// Footprint correlation configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TraceConfig {
    #[serde(default)]
    pub footprint_match: FootprintMatch,
}

/// Event feed configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Events buffered between readers and the table owner
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

/// Complete conntracker configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConntrackerConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub tracing: TraceConfig,

    #[serde(default)]
    pub feed: FeedConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_logfile() -> PathBuf {
    PathBuf::from("/tmp/conntracker.log")
}

fn default_channel_capacity() -> usize {
    1024
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            logfile: default_logfile(),
            metrics: false,
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl ConntrackerConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| {
                ConntrackerError::Config(format!(
                    "Failed to parse config file {}: {}",
                    path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(ConntrackerError::Io(e)),
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            ConntrackerError::Config(format!("Failed to serialize config: {}", e))
        })?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Parsed form of `logging.level`
    pub fn level_filter(&self) -> Result<LevelFilter> {
        self.logging.level.parse::<LevelFilter>().map_err(|_| {
            ConntrackerError::Config(format!("invalid log level '{}'", self.logging.level))
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.level_filter()?;

        if self.output.logfile.as_os_str().is_empty() {
            return Err(ConntrackerError::Config(
                "output.logfile must not be empty".to_string(),
            ));
        }

        if self.feed.channel_capacity == 0 {
            return Err(ConntrackerError::Config(
                "feed.channel_capacity must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}
