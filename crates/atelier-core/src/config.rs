//! Configuration for image editing sessions
//!
//! Handles loading, saving, and validating the session engine settings.
//! Every field has a default, so an empty TOML document is a valid config.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::provider::{AspectRatio, ImageSize, SessionOptions, TurnOptions};
use crate::session::{ExpiredEditPolicy, StartConflict};

/// Default values, shared with the tool parameter schemas
pub mod defaults {
    pub const MAX_PROMPT_LEN: usize = 2000;
    pub const SESSION_TIMEOUT_SECS: u64 = 30 * 60;
    pub const REAP_INTERVAL_SECS: u64 = 5 * 60;
    pub const MAX_SESSIONS_PER_OWNER: usize = 10;
    /// Base64 payload limit for inline embedding (~50KB)
    pub const INLINE_LIMIT_BYTES: usize = 50_000;
}

/// Session engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageSessionConfig {
    /// Maximum prompt length in characters
    pub max_prompt_len: usize,
    /// Idle time after which a session is expired
    pub session_timeout_secs: u64,
    /// How often the reaper scans for idle sessions
    pub reap_interval_secs: u64,
    /// Concurrently open sessions allowed per owner
    pub max_sessions_per_owner: usize,
    /// Largest base64 payload embedded inline
    pub inline_limit_bytes: usize,
    /// Model for new sessions (provider default if unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
    /// System instruction for new sessions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<String>,
    pub expired_edit: ExpiredEditPolicy,
    pub on_existing: StartConflict,
    pub default_aspect_ratio: AspectRatio,
    pub default_image_size: ImageSize,
}

impl Default for ImageSessionConfig {
    fn default() -> Self {
        Self {
            max_prompt_len: defaults::MAX_PROMPT_LEN,
            session_timeout_secs: defaults::SESSION_TIMEOUT_SECS,
            reap_interval_secs: defaults::REAP_INTERVAL_SECS,
            max_sessions_per_owner: defaults::MAX_SESSIONS_PER_OWNER,
            inline_limit_bytes: defaults::INLINE_LIMIT_BYTES,
            default_model: None,
            system_instruction: None,
            expired_edit: ExpiredEditPolicy::Fail,
            on_existing: StartConflict::Reject,
            default_aspect_ratio: AspectRatio::default(),
            default_image_size: ImageSize::default(),
        }
    }
}

impl ImageSessionConfig {
    /// Explicit-key addressing: callers hold session ids, stale ids fail
    pub fn explicit_key() -> Self {
        Self::default()
    }

    /// Owner-keyed addressing: one session per owner, stale sessions restart
    pub fn owner_keyed() -> Self {
        Self {
            expired_edit: ExpiredEditPolicy::Restart,
            on_existing: StartConflict::Replace,
            ..Self::default()
        }
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs)
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            model: self.default_model.clone(),
            system_instruction: self.system_instruction.clone(),
        }
    }

    pub fn default_turn_options(&self) -> TurnOptions {
        TurnOptions {
            aspect_ratio: self.default_aspect_ratio,
            image_size: self.default_image_size,
        }
    }

    /// Reject settings that would make the engine unusable
    pub fn validate(&self) -> Result<()> {
        if self.max_prompt_len == 0 {
            return Err(Error::Config("max_prompt_len must be greater than 0".into()));
        }
        if self.session_timeout_secs == 0 {
            return Err(Error::Config("session_timeout_secs must be greater than 0".into()));
        }
        if self.reap_interval_secs == 0 {
            return Err(Error::Config("reap_interval_secs must be greater than 0".into()));
        }
        if self.max_sessions_per_owner == 0 {
            return Err(Error::Config(
                "max_sessions_per_owner must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }
}

/// Configuration manager for loading/saving config
pub struct ConfigManager {
    config_path: PathBuf,
    config: ImageSessionConfig,
}

impl ConfigManager {
    /// Create a config manager with a specific path
    ///
    /// Loads the file if it exists, otherwise starts from defaults.
    pub fn with_path(config_path: PathBuf) -> Result<Self> {
        let config = if config_path.exists() {
            Self::load_from_path(&config_path)?
        } else {
            ImageSessionConfig::default()
        };

        Ok(Self {
            config_path,
            config,
        })
    }

    /// Load configuration from a file
    fn load_from_path(path: &Path) -> Result<ImageSessionConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?;

        ImageSessionConfig::from_toml_str(&content)
    }

    /// Get the current configuration
    pub fn config(&self) -> &ImageSessionConfig {
        &self.config
    }

    /// Get mutable configuration
    pub fn config_mut(&mut self) -> &mut ImageSessionConfig {
        &mut self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Save the current configuration to file
    pub fn save(&self) -> Result<()> {
        self.config.validate()?;

        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("Failed to create config dir: {}", e)))?;
        }

        let content = toml::to_string_pretty(&self.config)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(&self.config_path, content)
            .map_err(|e| Error::Config(format!("Failed to write config: {}", e)))?;

        Ok(())
    }
}
