//! Configuration management for growthlog.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::net::IpAddr;
use std::path::PathBuf;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "growthlog";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "plants.db";

/// Default upload directory name.
const UPLOAD_DIR_NAME: &str = "uploads";

/// Secret used when none is configured. Fine for a single local user; set
/// `server.secret_key` when the server is reachable by others.
const DEFAULT_SECRET_KEY: &str = "growthlog-development-secret";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `GROWTHLOG_`, sections split on `__`)
/// 2. TOML config file at `~/.config/growthlog/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration.
    pub server: ServerConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Upload configuration.
    pub uploads: UploadConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind.
    pub bind_address: IpAddr,
    /// Port to listen on.
    pub port: u16,
    /// Secret used to sign the one-shot notice cookie.
    pub secret_key: String,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/growthlog/plants.db`
    pub database_path: Option<PathBuf>,
}

/// Upload-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Directory for uploaded photos.
    /// Defaults to `~/.local/share/growthlog/uploads`
    pub directory: Option<PathBuf>,
    /// Largest accepted photo, in bytes.
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::from([127, 0, 0, 1]),
            port: 5000,
            secret_key: DEFAULT_SECRET_KEY.to_string(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            directory: None, // Resolved at runtime
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("GROWTHLOG_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(Error::ConfigValidation {
                message: "server.port must be greater than 0".to_string(),
            });
        }

        if self.server.secret_key.trim().is_empty() {
            return Err(Error::ConfigValidation {
                message: "server.secret_key cannot be empty".to_string(),
            });
        }

        if self.uploads.max_upload_bytes == 0 {
            return Err(Error::ConfigValidation {
                message: "uploads.max_upload_bytes must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the upload directory, resolving defaults if not set.
    #[must_use]
    pub fn upload_dir(&self) -> PathBuf {
        self.uploads
            .directory
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(UPLOAD_DIR_NAME))
    }

    /// Whether the notice cookie is signed with the built-in secret.
    #[must_use]
    pub fn uses_default_secret(&self) -> bool {
        self.server.secret_key == DEFAULT_SECRET_KEY
    }
}
