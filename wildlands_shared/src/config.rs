//! Configuration.
//!
//! Loads client configuration from JSON strings (file IO left to the app).

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// WebSocket endpoint, e.g. `ws://localhost:3030/ws`.
    #[serde(default = "default_server_url")]
    pub server_url: String,
    /// Name sent in `Hello`.
    #[serde(default = "default_username")]
    pub username: String,
    /// Keepalive ping period.
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,
}

fn default_server_url() -> String {
    "ws://localhost:3030/ws".to_string()
}

fn default_username() -> String {
    "Player".to_string()
}

fn default_ping_interval_ms() -> u64 {
    5_000
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            username: default_username(),
            ping_interval_ms: default_ping_interval_ms(),
        }
    }
}

impl ClientConfig {
    /// Parses config from JSON. Missing fields take their defaults.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms.max(1))
    }
}
