//! Server configuration.

use std::time::Duration;

use hypha_settings::ServerSettings;
use serde::{Deserialize, Serialize};

/// Runtime configuration for [`crate::HyphaServer`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Seconds between heartbeats on each session.
    pub heartbeat_interval_secs: u64,
    /// Seconds a session send may block before it counts as failed.
    pub send_timeout_secs: u64,
    /// Maximum steps in one chain request.
    pub max_chain_steps: usize,
    /// Maximum characters in one step payload.
    pub max_payload_chars: usize,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
}

impl ServerConfig {
    /// Heartbeat period. Never zero.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }

    /// Per-send deadline. Never zero.
    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs.max(1))
    }

    /// `host:port` for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        let settings = ServerSettings::default();
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            heartbeat_interval_secs: settings.heartbeat_interval_secs,
            send_timeout_secs: settings.send_timeout_secs,
            max_chain_steps: settings.max_chain_steps,
            max_payload_chars: settings.max_payload_chars,
            max_message_size: settings.max_message_size,
        }
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            heartbeat_interval_secs: settings.heartbeat_interval_secs,
            send_timeout_secs: settings.send_timeout_secs,
            max_chain_steps: settings.max_chain_steps,
            max_payload_chars: settings.max_payload_chars,
            max_message_size: settings.max_message_size,
        }
    }
}
