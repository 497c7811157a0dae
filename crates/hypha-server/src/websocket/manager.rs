//! Live client sessions.
//!
//! The session map and per-session stats sit behind one mutex. The lock is
//! never held across an await: sends, closes and handshakes run on transport
//! handles cloned out of the map. Each registration gets a generation number,
//! so a task belonging to a replaced session cannot act on its successor.
//!
//! Every send and close is bounded by the send timeout. A peer that stops
//! reading fails its next send instead of stalling broadcasts, heartbeats
//! or its own disconnect.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use metrics::{counter, gauge};
use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::heartbeat::{HeartbeatResult, pong_message, run_heartbeat};
use super::session::{ConnectionStats, SessionState, StatsSnapshot};
use super::transport::{Transport, TransportError};
use crate::metrics::{
    WS_BROADCAST_FAILURES_TOTAL, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};

/// Failure of a manager operation on one session.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The transport handshake failed; nothing was registered.
    #[error("handshake failed for {client_id}: {source}")]
    Handshake {
        /// Client id.
        client_id: String,
        /// Transport error.
        #[source]
        source: TransportError,
    },
    /// No live session under this id.
    #[error("client {0} is not connected")]
    NotConnected(String),
    /// A send failed; the session has been disconnected.
    #[error("delivery to {client_id} failed: {source}")]
    Delivery {
        /// Client id.
        client_id: String,
        /// Transport error.
        #[source]
        source: TransportError,
    },
    /// The manager has been shut down.
    #[error("connection manager is shut down")]
    ShuttingDown,
}

struct SessionEntry {
    generation: u64,
    transport: Arc<dyn Transport>,
    stats: ConnectionStats,
    cancel: CancellationToken,
    heartbeat: JoinHandle<HeartbeatResult>,
}

#[derive(Default)]
struct Registry {
    sessions: HashMap<String, SessionEntry>,
    /// Ids mid-handshake or mid-close.
    transitions: HashMap<String, SessionState>,
    next_generation: u64,
    shut_down: bool,
}

/// Default bound on one send or close.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Tracks live sessions, runs their heartbeats, and fans out broadcasts.
pub struct ConnectionManager {
    registry: Mutex<Registry>,
    heartbeat_interval: Duration,
    send_timeout: Duration,
}

impl ConnectionManager {
    /// Manager sending heartbeats every `heartbeat_interval`.
    pub fn new(heartbeat_interval: Duration) -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            heartbeat_interval,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    /// Override the per-send deadline.
    #[must_use]
    pub fn with_send_timeout(mut self, send_timeout: Duration) -> Self {
        self.send_timeout = send_timeout;
        self
    }

    /// Send with the manager's deadline. A timeout counts as a failed send.
    pub(crate) async fn send_bounded(
        &self,
        transport: &dyn Transport,
        message: &Value,
    ) -> Result<(), TransportError> {
        timeout(self.send_timeout, transport.send_json(message))
            .await
            .unwrap_or_else(|_| Err(TransportError::Timeout(self.send_timeout)))
    }

    /// Close best effort, giving up after the send timeout.
    async fn close_quietly(&self, client_id: &str, transport: &dyn Transport) {
        match timeout(self.send_timeout, transport.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(client_id, error = %e, "error closing transport"),
            Err(_) => warn!(client_id, "close timed out, dropping transport"),
        }
    }

    /// Accept `transport` and register it as `client_id`.
    ///
    /// A live session with the same id is disconnected first. On handshake
    /// failure the transport is closed and nothing is registered.
    pub async fn connect(
        self: &Arc<Self>,
        client_id: &str,
        transport: Arc<dyn Transport>,
    ) -> Result<(), ConnectionError> {
        let _ = self.register(client_id, transport).await?;
        Ok(())
    }

    async fn register(
        self: &Arc<Self>,
        client_id: &str,
        transport: Arc<dyn Transport>,
    ) -> Result<(u64, CancellationToken), ConnectionError> {
        if self.remove(client_id, None).await {
            info!(client_id, "replacing existing session");
        }
        let _ = self
            .registry
            .lock()
            .transitions
            .insert(client_id.to_owned(), SessionState::Connecting);

        if let Err(source) = transport.accept().await {
            warn!(client_id, error = %source, "handshake failed");
            self.clear_transition(client_id, SessionState::Connecting);
            self.close_quietly(client_id, transport.as_ref()).await;
            return Err(ConnectionError::Handshake {
                client_id: client_id.to_owned(),
                source,
            });
        }

        let registered = {
            let mut registry = self.registry.lock();
            if registry.transitions.get(client_id) == Some(&SessionState::Connecting) {
                let _ = registry.transitions.remove(client_id);
            }
            if registry.shut_down {
                None
            } else {
                registry.next_generation += 1;
                let generation = registry.next_generation;
                let cancel = CancellationToken::new();
                let heartbeat = tokio::spawn(run_heartbeat(
                    Arc::clone(self),
                    client_id.to_owned(),
                    generation,
                    self.heartbeat_interval,
                    cancel.clone(),
                ));
                let entry = SessionEntry {
                    generation,
                    transport: Arc::clone(&transport),
                    stats: ConnectionStats::new(Utc::now()),
                    cancel: cancel.clone(),
                    heartbeat,
                };
                let displaced = registry.sessions.insert(client_id.to_owned(), entry);
                Some((generation, cancel, displaced))
            }
        };

        let Some((generation, cancel, displaced)) = registered else {
            self.close_quietly(client_id, transport.as_ref()).await;
            return Err(ConnectionError::ShuttingDown);
        };

        // A concurrent connect for the same id registered between our
        // removal and insert.
        if let Some(displaced) = displaced {
            displaced.cancel.cancel();
            self.close_quietly(client_id, displaced.transport.as_ref()).await;
            record_disconnect();
        }

        counter!(WS_CONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
        info!(client_id, generation, "client connected");
        Ok((generation, cancel))
    }

    /// Connect, then read inbound messages until the peer closes, the
    /// transport fails, or the session is disconnected elsewhere.
    ///
    /// A `ping` text message is answered with a pong.
    pub async fn serve(self: &Arc<Self>, client_id: &str, transport: Arc<dyn Transport>) {
        let Ok((generation, cancel)) = self.register(client_id, Arc::clone(&transport)).await
        else {
            return;
        };

        loop {
            let received = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                result = transport.receive_text() => result,
            };
            match received {
                Ok(Some(text)) => {
                    self.record_received(client_id, generation);
                    if text.trim().eq_ignore_ascii_case("ping")
                        && self.send_to(client_id, &pong_message(Utc::now())).await.is_err()
                    {
                        break;
                    }
                }
                Ok(None) => {
                    debug!(client_id, "peer closed");
                    break;
                }
                Err(e) => {
                    warn!(client_id, error = %e, "receive failed");
                    break;
                }
            }
        }

        let _ = self.disconnect_session(client_id, generation).await;
    }

    /// Remove `client_id`: cancel its heartbeat, close its transport, drop
    /// its stats. Returns `false` if it was not connected.
    pub async fn disconnect(&self, client_id: &str) -> bool {
        self.remove(client_id, None).await
    }

    /// Remove `client_id` only if it is still the given registration.
    pub(crate) async fn disconnect_session(&self, client_id: &str, generation: u64) -> bool {
        self.remove(client_id, Some(generation)).await
    }

    async fn remove(&self, client_id: &str, generation: Option<u64>) -> bool {
        let entry = {
            let mut registry = self.registry.lock();
            let matches = registry
                .sessions
                .get(client_id)
                .is_some_and(|entry| generation.is_none_or(|g| entry.generation == g));
            if !matches {
                return false;
            }
            let Some(entry) = registry.sessions.remove(client_id) else {
                return false;
            };
            entry.cancel.cancel();
            let _ = registry
                .transitions
                .insert(client_id.to_owned(), SessionState::Closing);
            entry
        };

        self.close_quietly(client_id, entry.transport.as_ref()).await;
        self.clear_transition(client_id, SessionState::Closing);
        record_disconnect();
        info!(client_id, generation = entry.generation, "client disconnected");
        true
    }

    /// Send `message` to every live session not in `exclude`.
    ///
    /// Sends run concurrently. Sessions whose send fails are disconnected
    /// before this returns; the failures are not reported to the caller.
    pub async fn broadcast(&self, message: &Value, exclude: &HashSet<String>) {
        let targets: Vec<(String, u64, Arc<dyn Transport>)> = {
            let registry = self.registry.lock();
            registry
                .sessions
                .iter()
                .filter(|(id, _)| !exclude.contains(*id))
                .map(|(id, entry)| (id.clone(), entry.generation, Arc::clone(&entry.transport)))
                .collect()
        };

        let outcomes = join_all(targets.into_iter().map(|(id, generation, transport)| {
            async move {
                let result = self.send_bounded(transport.as_ref(), message).await;
                (id, generation, result)
            }
        }))
        .await;

        let recipients = outcomes.len();
        let mut failed = Vec::new();
        {
            let mut registry = self.registry.lock();
            for (id, generation, result) in outcomes {
                match result {
                    Ok(()) => {
                        if let Some(entry) = registry.sessions.get_mut(&id) {
                            if entry.generation == generation {
                                entry.stats.messages_sent += 1;
                            }
                        }
                    }
                    Err(e) => failed.push((id, generation, e)),
                }
            }
        }

        debug!(recipients, failed = failed.len(), "broadcast sent");
        for (id, generation, e) in failed {
            warn!(client_id = %id, error = %e, "broadcast delivery failed");
            counter!(WS_BROADCAST_FAILURES_TOTAL).increment(1);
            let _ = self.remove(&id, Some(generation)).await;
        }
    }

    /// Send `message` to one session. A failed send disconnects it.
    pub async fn send_to(&self, client_id: &str, message: &Value) -> Result<(), ConnectionError> {
        let (generation, transport) = {
            let registry = self.registry.lock();
            let entry = registry
                .sessions
                .get(client_id)
                .ok_or_else(|| ConnectionError::NotConnected(client_id.to_owned()))?;
            (entry.generation, Arc::clone(&entry.transport))
        };

        match self.send_bounded(transport.as_ref(), message).await {
            Ok(()) => {
                if let Some(entry) = self.registry.lock().sessions.get_mut(client_id) {
                    if entry.generation == generation {
                        entry.stats.messages_sent += 1;
                    }
                }
                Ok(())
            }
            Err(source) => {
                warn!(client_id, error = %source, "send failed");
                let _ = self.remove(client_id, Some(generation)).await;
                Err(ConnectionError::Delivery {
                    client_id: client_id.to_owned(),
                    source,
                })
            }
        }
    }

    /// Lifecycle state of `client_id`.
    pub fn state(&self, client_id: &str) -> SessionState {
        let registry = self.registry.lock();
        if registry.sessions.contains_key(client_id) {
            return SessionState::Live;
        }
        registry
            .transitions
            .get(client_id)
            .copied()
            .unwrap_or(SessionState::Closed)
    }

    /// Copy of every live session's stats.
    pub fn get_connection_stats(&self) -> StatsSnapshot {
        let registry = self.registry.lock();
        StatsSnapshot {
            total_connections: registry.sessions.len(),
            connections: registry
                .sessions
                .iter()
                .map(|(id, entry)| (id.clone(), entry.stats.clone()))
                .collect(),
        }
    }

    /// Number of live sessions.
    pub fn connection_count(&self) -> usize {
        self.registry.lock().sessions.len()
    }

    /// Live session ids, sorted.
    pub fn connection_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.registry.lock().sessions.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Disconnect every session and refuse new ones.
    pub async fn shutdown(&self) {
        let drained: Vec<(String, SessionEntry)> = {
            let mut registry = self.registry.lock();
            registry.shut_down = true;
            registry.sessions.drain().collect()
        };
        info!(sessions = drained.len(), "closing all sessions");

        let mut closes = Vec::with_capacity(drained.len());
        let mut heartbeats = Vec::with_capacity(drained.len());
        for (id, entry) in drained {
            entry.cancel.cancel();
            heartbeats.push(entry.heartbeat);
            let transport = entry.transport;
            closes.push(async move {
                self.close_quietly(&id, transport.as_ref()).await;
                record_disconnect();
            });
        }
        let _ = join_all(closes).await;
        let _ = join_all(heartbeats).await;
    }

    pub(crate) fn session_transport(
        &self,
        client_id: &str,
        generation: u64,
    ) -> Option<Arc<dyn Transport>> {
        let registry = self.registry.lock();
        registry
            .sessions
            .get(client_id)
            .filter(|entry| entry.generation == generation)
            .map(|entry| Arc::clone(&entry.transport))
    }

    pub(crate) fn record_heartbeat(&self, client_id: &str, generation: u64) {
        self.update_stats(client_id, generation, |stats| stats.last_heartbeat = Utc::now());
    }

    fn record_received(&self, client_id: &str, generation: u64) {
        self.update_stats(client_id, generation, |stats| stats.messages_received += 1);
    }

    fn update_stats(
        &self,
        client_id: &str,
        generation: u64,
        update: impl FnOnce(&mut ConnectionStats),
    ) {
        let mut registry = self.registry.lock();
        if let Some(entry) = registry.sessions.get_mut(client_id) {
            if entry.generation == generation {
                update(&mut entry.stats);
            }
        }
    }

    fn clear_transition(&self, client_id: &str, state: SessionState) {
        let mut registry = self.registry.lock();
        if registry.transitions.get(client_id) == Some(&state) {
            let _ = registry.transitions.remove(client_id);
        }
    }
}

fn record_disconnect() {
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
}
