//! Service configuration
//!
//! Layered in this order, later layers winning:
//! 1. built-in defaults
//! 2. optional JSON file (`--config`)
//! 3. environment variables
//!
//! | Variable | Field |
//! |---|---|
//! | `TARANTOOL_HOST` | `backend.address` |
//! | `TARANTOOL_USER` | `backend.user` |
//! | `TARANTOOL_PASS` | `backend.password` |
//! | `TARANTOOL_SPACE` | `backend.space` |
//! | `TARANTOOL_INDEX` | `backend.index` |
//! | `TARANTOOL_TIMEOUT_MS` | `backend.call_timeout_ms` |
//! | `HTTP_HOST` | `http.host` |
//! | `HTTP_PORT` | `http.port` |
//! | `HTTP_REQUEST_TIMEOUT_SECS` | `http.request_timeout_secs` |
//! | `LOG_LEVEL` | `logging.level` |
//! | `LOG_FORMAT` | `logging.format` |

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::BackendConfig;
use crate::http_server::HttpServerConfig;
use crate::observability::{LogConfig, LogFormat};

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value for {var}: {value:?} ({reason})")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0} must not be empty")]
    Empty(&'static str),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub http: HttpServerConfig,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub logging: LogConfig,
}

impl Config {
    /// Load from an optional file plus the process environment
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_from(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON file; absent fields take their defaults
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value
    pub fn apply_env_from<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("TARANTOOL_HOST") {
            self.backend.address = v;
        }
        if let Some(v) = lookup("TARANTOOL_USER") {
            self.backend.user = v;
        }
        if let Some(v) = lookup("TARANTOOL_PASS") {
            self.backend.password = v;
        }
        if let Some(v) = lookup("TARANTOOL_SPACE") {
            self.backend.space = v;
        }
        if let Some(v) = lookup("TARANTOOL_INDEX") {
            self.backend.index = v;
        }
        if let Some(v) = lookup("TARANTOOL_TIMEOUT_MS") {
            self.backend.call_timeout_ms = parse_var("TARANTOOL_TIMEOUT_MS", v)?;
        }
        if let Some(v) = lookup("HTTP_HOST") {
            self.http.host = v;
        }
        if let Some(v) = lookup("HTTP_PORT") {
            self.http.port = parse_var("HTTP_PORT", v)?;
        }
        if let Some(v) = lookup("HTTP_REQUEST_TIMEOUT_SECS") {
            self.http.request_timeout_secs = parse_var("HTTP_REQUEST_TIMEOUT_SECS", v)?;
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = lookup("LOG_FORMAT") {
            self.logging.format = parse_var::<LogFormat>("LOG_FORMAT", v)?;
        }
        Ok(())
    }

    /// Reject values that would only fail later at connect or bind time
    pub fn validate(&self) -> ConfigResult<()> {
        if self.backend.address.trim().is_empty() {
            return Err(ConfigError::Empty("backend.address"));
        }
        if self.backend.space.trim().is_empty() {
            return Err(ConfigError::Empty("backend.space"));
        }
        if self.backend.index.trim().is_empty() {
            return Err(ConfigError::Empty("backend.index"));
        }
        if self.http.host.trim().is_empty() {
            return Err(ConfigError::Empty("http.host"));
        }
        if self.backend.call_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                var: "backend.call_timeout_ms",
                value: "0".to_string(),
                reason: "must be > 0".to_string(),
            });
        }
        if self.http.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                var: "http.request_timeout_secs",
                value: "0".to_string(),
                reason: "must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_var<T>(var: &'static str, value: String) -> ConfigResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue {
            var,
            reason: e.to_string(),
            value,
        })
}
