//! Per-session bookkeeping.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Lifecycle of one client id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Handshake in progress.
    Connecting,
    /// Registered, heartbeat running.
    Live,
    /// Removed from the live set, transport closing.
    Closing,
    /// Gone. Also reported for ids never seen.
    Closed,
}

/// Counters for one live session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConnectionStats {
    /// When the session went live.
    pub connected_at: DateTime<Utc>,
    /// Inbound messages read.
    pub messages_received: u64,
    /// Outbound messages delivered, heartbeats excluded.
    pub messages_sent: u64,
    /// Last successful heartbeat send.
    pub last_heartbeat: DateTime<Utc>,
}

impl ConnectionStats {
    pub(crate) fn new(now: DateTime<Utc>) -> Self {
        Self {
            connected_at: now,
            messages_received: 0,
            messages_sent: 0,
            last_heartbeat: now,
        }
    }
}

/// Point-in-time copy of every live session's stats.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Number of live sessions.
    pub total_connections: usize,
    /// Stats keyed by client id.
    pub connections: HashMap<String, ConnectionStats>,
}
