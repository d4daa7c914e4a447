//! Application configuration
//!
//! Stored as TOML. Every section has defaults, so a partial file (or none at
//! all) is valid:
//!
//! ```toml
//! log_level = "debug"
//!
//! [receiver]
//! expected_stream_name = "Stream1"
//! listen_port = 6980
//!
//! [pipeline]
//! chunk_size = 512
//! overflow = "drop_newest"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub use crate::audio::pipeline::{OverflowPolicy, PipelineConfig};
pub use crate::network::receiver::ReceiverConfig;
pub use crate::network::sender::{AudioFormat, SenderConfig};

const CONFIG_FILE_NAME: &str = "config.toml";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Default tracing filter; `RUST_LOG` takes precedence
    pub log_level: String,
    pub sender: SenderConfig,
    pub receiver: ReceiverConfig,
    pub pipeline: PipelineConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            sender: SenderConfig::default(),
            receiver: ReceiverConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl AppConfig {
    /// Parse a TOML document
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let config = Self::from_toml(&text)?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Write the configuration, creating parent directories as needed
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, self.to_toml()?)?;
        tracing::info!("Saved configuration to {}", path.display());
        Ok(())
    }

    /// `config.toml` in the platform configuration directory
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "vban-stream").map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Load `path` if given (it must exist), else the default file if
    /// present, else built-in defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(default) if default.is_file() => Self::load(&default),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.log_level.trim().is_empty() {
            return Err(Error::Config("log_level must not be empty".into()));
        }
        self.sender.validate()?;
        self.receiver.validate()?;
        self.pipeline.validate()?;
        Ok(())
    }
}
