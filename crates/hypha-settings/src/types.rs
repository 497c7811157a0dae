//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a partial
//! JSON file only needs the keys it overrides.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root settings type for the hypha server.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HyphaSettings {
    /// HTTP/WebSocket server settings.
    pub server: ServerSettings,
    /// Request quota settings.
    pub rate_limit: RateLimitSettings,
    /// Credential verification settings.
    pub auth: AuthSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

/// Server network and runtime settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// HTTP port.
    pub port: u16,
    /// Period between liveness messages on each live session.
    pub heartbeat_interval_secs: u64,
    /// Longest a single send to a session may take before the session is
    /// treated as dead.
    pub send_timeout_secs: u64,
    /// Maximum steps accepted in one chain request.
    pub max_chain_steps: usize,
    /// Maximum characters in one step payload.
    pub max_payload_chars: usize,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            heartbeat_interval_secs: 30,
            send_timeout_secs: 10,
            max_chain_steps: 10,
            max_payload_chars: 1000,
            max_message_size: 1024 * 1024,
        }
    }
}

/// Per-client, per-endpoint quota settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RateLimitSettings {
    /// Counting window length.
    pub window_secs: u64,
    /// Limit used when neither an endpoint nor a method entry matches.
    pub fallback_limit: u32,
    /// Per-HTTP-method limits (upper-case method names).
    pub method_limits: BTreeMap<String, u32>,
    /// Per-path overrides, taking precedence over method limits.
    pub endpoint_limits: BTreeMap<String, u32>,
    /// Shared counter store URL. In-process counters are used when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis_url: Option<String>,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        let method_limits = [("GET", 120), ("POST", 60), ("PUT", 60), ("DELETE", 30)]
            .into_iter()
            .map(|(m, l)| (m.to_string(), l))
            .collect();
        let endpoint_limits = [
            ("/api/chain/execute", 30),
            ("/api/agent/neuroweave/ask", 40),
            ("/api/agent/rootbloom/ask", 40),
        ]
        .into_iter()
        .map(|(p, l)| (p.to_string(), l))
        .collect();
        Self {
            window_secs: 60,
            fallback_limit: 60,
            method_limits,
            endpoint_limits,
            redis_url: None,
        }
    }
}

/// Credential verification settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// HS256 secret for bearer tokens. Without it every client is keyed by IP.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwt_secret: Option<String>,
}

/// Logging settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
    /// Emit JSON lines instead of the compact human format.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
