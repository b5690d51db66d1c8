//! Backend Connection Configuration

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Where and how to reach the engine
#[derive(Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Engine address as `host:port` (default: "tarantool:3301")
    #[serde(default = "default_address")]
    pub address: String,

    /// User name; empty or "guest" skips authentication
    #[serde(default)]
    pub user: String,

    #[serde(default)]
    pub password: String,

    /// Space holding the `[key, value]` tuples (default: "kv")
    #[serde(default = "default_space")]
    pub space: String,

    /// Unique index over the key field (default: "primary")
    #[serde(default = "default_index")]
    pub index: String,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Bound on every individual backend call (default: 3000)
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

fn default_address() -> String {
    "tarantool:3301".to_string()
}

fn default_space() -> String {
    "kv".to_string()
}

fn default_index() -> String {
    "primary".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_call_timeout_ms() -> u64 {
    3000
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            user: String::new(),
            password: String::new(),
            space: default_space(),
            index: default_index(),
            connect_timeout_ms: default_connect_timeout_ms(),
            call_timeout_ms: default_call_timeout_ms(),
        }
    }
}

impl BackendConfig {
    pub fn with_address(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Default::default()
        }
    }

    /// Whether the connection must authenticate after the greeting
    pub fn requires_auth(&self) -> bool {
        !self.user.is_empty() && self.user != "guest"
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("address", &self.address)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("space", &self.space)
            .field("index", &self.index)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("call_timeout_ms", &self.call_timeout_ms)
            .finish()
    }
}
