//! Configuration management for the trust layer.
//!
//! TOML-based configuration merged from defaults, an optional file and
//! environment variables, validated before use.

use crate::utils::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "ugh.toml";

/// Environment variable prefix for configuration
pub const ENV_PREFIX: &str = "UGH";

/// Complete configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UghConfig {
    /// Credential, challenge and codec limits
    pub crypto: CryptoConfig,
    /// Where users and keys live
    pub storage: StorageConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Lifetimes and decode limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CryptoConfig {
    /// Lifetime of an issued account credential, in seconds
    pub credential_lifetime: u64,
    /// Lifetime of an authentication challenge, in seconds
    pub challenge_lifetime: u64,
    /// Largest serialized message accepted by the decoder, in bytes
    pub max_message_size: usize,
    /// Deepest dict nesting accepted by the decoder
    pub max_nesting_depth: usize,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Base directory for data storage
    pub data_dir: PathBuf,
    /// Database directory holding registered users
    pub users_db: PathBuf,
    /// Directory holding the local secret key seed
    pub keys_dir: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            credential_lifetime: crate::defaults::DEFAULT_CREDENTIAL_LIFETIME,
            challenge_lifetime: crate::defaults::DEFAULT_CHALLENGE_LIFETIME,
            max_message_size: crate::MAX_MESSAGE_SIZE,
            max_nesting_depth: crate::MAX_NESTING_DEPTH,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ugh");
        Self::rooted_at(data_dir)
    }
}

impl StorageConfig {
    /// Storage layout with every path under `data_dir`
    pub fn rooted_at(data_dir: PathBuf) -> Self {
        Self {
            users_db: data_dir.join("users.db"),
            keys_dir: data_dir.join("keys"),
            data_dir,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl UghConfig {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read, parsed or validated
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(ConfigError::from)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from defaults, then a file, then the environment
    ///
    /// Without an explicit path the first existing default location is used.
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = config_file {
            config = Self::from_file(path)?;
        } else {
            let default_locations = [
                PathBuf::from(DEFAULT_CONFIG_FILE),
                dirs::config_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("ugh")
                    .join(DEFAULT_CONFIG_FILE),
            ];

            if let Some(location) = default_locations.iter().find(|l| l.exists()) {
                log::debug!("Loading configuration from {}", location.display());
                config = Self::from_file(location)?;
            }
        }

        config = config.merge_from_env()?;
        config.validate()?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    /// Apply `UGH_*` environment overrides
    fn merge_from_env(mut self) -> Result<Self> {
        if let Ok(level) = std::env::var(format!("{ENV_PREFIX}_LOGGING_LEVEL")) {
            self.logging.level = level;
        }

        if let Ok(data_dir) = std::env::var(format!("{ENV_PREFIX}_STORAGE_DATA_DIR")) {
            self.storage = StorageConfig::rooted_at(PathBuf::from(data_dir));
        }

        let lifetime_var = format!("{ENV_PREFIX}_CRYPTO_CHALLENGE_LIFETIME");
        if let Ok(lifetime) = std::env::var(&lifetime_var) {
            self.crypto.challenge_lifetime =
                lifetime.parse().map_err(|_| ConfigError::InvalidValue {
                    field: lifetime_var,
                    value: lifetime,
                })?;
        }

        Ok(self)
    }

    /// Validate the configuration for consistency and correctness
    pub fn validate(&self) -> Result<()> {
        let zero_checks = [
            ("crypto.credential_lifetime", self.crypto.credential_lifetime == 0),
            ("crypto.challenge_lifetime", self.crypto.challenge_lifetime == 0),
            ("crypto.max_message_size", self.crypto.max_message_size == 0),
            ("crypto.max_nesting_depth", self.crypto.max_nesting_depth == 0),
        ];
        if let Some((field, _)) = zero_checks.iter().find(|(_, is_zero)| *is_zero) {
            return Err(ConfigError::InvalidValue {
                field: (*field).to_string(),
                value: "0".to_string(),
            }
            .into());
        }

        match self.logging.level.as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            _ => {
                return Err(ConfigError::InvalidValue {
                    field: "logging.level".to_string(),
                    value: self.logging.level.clone(),
                }
                .into());
            }
        }

        Ok(())
    }

    /// Ensure the data and key directories exist
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [&self.storage.data_dir, &self.storage.keys_dir] {
            if !dir.exists() {
                std::fs::create_dir_all(dir).map_err(|_| ConfigError::DirectoryCreation {
                    path: dir.display().to_string(),
                })?;
            }
        }

        Ok(())
    }

    /// Get the configuration as a pretty-printed TOML string
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| {
            ConfigError::ParseError {
                reason: e.to_string(),
            }
            .into()
        })
    }
}
