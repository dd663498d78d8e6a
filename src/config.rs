//! Configuration file support
//!
//! Configuration is a TOML file; CLI flags override file values. Every
//! field has a default so a bare `kenaz serve` works out of the box with a
//! `./vault` directory and `./kenaz.db` index.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("failed to parse config {0}: {1}")]
    Parse(PathBuf, toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Bearer-token authentication modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    #[default]
    Disabled,
    Token,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub vault: VaultConfig,
    pub sqlite: SqliteConfig,
    pub http: HttpConfig,
    pub log: LogConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Vault root directory; created at startup when missing.
    pub path: PathBuf,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./vault"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// Index database file; created when missing. Deleting it is a
    /// supported recovery, the reconciler rebuilds it on the next start.
    pub path: PathBuf,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./kenaz.db"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// tracing filter directive, e.g. "info" or "kenaz=debug".
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AuthConfig {
    pub mode: AuthMode,
    /// Required and non-empty when mode is `token`.
    pub token: String,
}

impl AuthConfig {
    pub fn enabled(&self) -> bool {
        self.mode == AuthMode::Token
    }
}

impl Config {
    /// Load configuration from a TOML file. A missing explicit path is an
    /// error; `None` returns the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(p) => {
                let content = std::fs::read_to_string(p)
                    .map_err(|e| ConfigError::Read(p.to_path_buf(), e))?;
                toml::from_str(&content).map_err(|e| ConfigError::Parse(p.to_path_buf(), e))?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate field constraints; errors name the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.vault.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("vault.path is required".into()));
        }
        if self.sqlite.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("sqlite.path is required".into()));
        }
        if self.http.port == 0 {
            return Err(ConfigError::Invalid(
                "http.port must be between 1 and 65535".into(),
            ));
        }
        if self.auth.mode == AuthMode::Token && self.auth.token.is_empty() {
            return Err(ConfigError::Invalid(
                "auth.token is required when auth.mode is \"token\"".into(),
            ));
        }
        Ok(())
    }
}
