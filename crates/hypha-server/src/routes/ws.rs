//! WebSocket upgrade and session stats.

use std::sync::Arc;

use axum::Json;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::response::Response;
use tracing::info;

use crate::server::AppState;
use crate::websocket::{StatsSnapshot, WsTransport};

/// `GET /ws/agents/{client_id}`
///
/// Upgrades and hands the socket to the connection manager, which owns the
/// session until the peer leaves or the server shuts down.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(client_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    let max_message_size = state.config.max_message_size;
    ws.max_message_size(max_message_size)
        .on_upgrade(move |socket| async move {
            info!(client_id = %client_id, "websocket upgraded");
            let transport = Arc::new(WsTransport::new(socket));
            state.connections.serve(&client_id, transport).await;
        })
}

/// `GET /api/ws/stats`
pub async fn stats(State(state): State<AppState>) -> Json<StatsSnapshot> {
    Json(state.connections.get_connection_stats())
}
