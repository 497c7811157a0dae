//! # hypha-server
//!
//! Axum HTTP + `WebSocket` surface for the hypha orchestration core.
//!
//! - [`websocket::ConnectionManager`]: live client sessions, per-session
//!   heartbeats, broadcast with cleanup of failed recipients
//! - HTTP endpoints: health, safety status and toggle, chain execution,
//!   connection stats, Prometheus metrics
//! - Rate-limit middleware in front of every `/api` route
//! - Graceful shutdown on Ctrl-C or SIGTERM via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod metrics;
pub mod ratelimit;
pub mod routes;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use server::{AppState, HyphaServer, ServerError};
pub use shutdown::{DrainOutcome, ShutdownCoordinator};
pub use websocket::{ConnectionManager, Transport, TransportError};
