//! Per-session liveness messages.
//!
//! Each live session gets one heartbeat task. It sends a heartbeat as soon
//! as the session goes live and then once per interval. The manager cancels
//! the task when the session is removed; a failed send removes the session.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::counter;
use serde_json::{Value, json};
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::manager::ConnectionManager;
use crate::metrics::WS_HEARTBEAT_FAILURES_TOTAL;

/// Why a heartbeat task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// The session was disconnected and the task cancelled.
    Cancelled,
    /// The session was no longer registered under this generation.
    SessionGone,
    /// A send failed; the session was disconnected.
    Failed,
}

/// `{"type":"heartbeat","timestamp":...}`
pub fn heartbeat_message(now: DateTime<Utc>) -> Value {
    json!({
        "type": "heartbeat",
        "timestamp": now.to_rfc3339(),
    })
}

/// Reply to a client's `ping`.
pub fn pong_message(now: DateTime<Utc>) -> Value {
    json!({
        "type": "pong",
        "timestamp": now.to_rfc3339(),
    })
}

/// Heartbeat loop for one session generation.
///
/// Cancellation is checked before every send, so once the manager has
/// cancelled `cancel` no further heartbeat reaches the transport.
pub(crate) async fn run_heartbeat(
    manager: Arc<ConnectionManager>,
    client_id: String,
    generation: u64,
    interval: Duration,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return HeartbeatResult::Cancelled,
            _ = ticker.tick() => {}
        }

        let Some(transport) = manager.session_transport(&client_id, generation) else {
            return HeartbeatResult::SessionGone;
        };

        let message = heartbeat_message(Utc::now());
        let sent = tokio::select! {
            biased;
            () = cancel.cancelled() => return HeartbeatResult::Cancelled,
            result = manager.send_bounded(transport.as_ref(), &message) => result,
        };

        match sent {
            Ok(()) => manager.record_heartbeat(&client_id, generation),
            Err(e) => {
                warn!(client_id = %client_id, error = %e, "heartbeat failed, disconnecting");
                counter!(WS_HEARTBEAT_FAILURES_TOTAL).increment(1);
                let _ = manager.disconnect_session(&client_id, generation).await;
                return HeartbeatResult::Failed;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_shape() {
        let msg = heartbeat_message(Utc::now());
        assert_eq!(msg["type"], "heartbeat");
        let ts = msg["timestamp"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(ts).is_ok());
    }

    #[test]
    fn pong_shape() {
        let msg = pong_message(Utc::now());
        assert_eq!(msg["type"], "pong");
        assert!(msg["timestamp"].is_string());
    }
}
