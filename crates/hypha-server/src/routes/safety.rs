//! Safe-mode status and toggle.

use axum::Json;
use axum::extract::State;
use chrono::Utc;
use hypha_safety::CoreStatus;
use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::server::AppState;

/// `POST /api/core/safe-mode/toggle` response.
#[derive(Debug, Serialize)]
pub struct ToggleResponse {
    /// Safe mode after the toggle.
    pub safe_mode: bool,
}

/// `GET /api/core/status`
pub async fn status(State(state): State<AppState>) -> Json<CoreStatus> {
    Json(state.safety.status())
}

/// `POST /api/core/safe-mode/toggle`
///
/// Connected clients are told about the change with a `safe_mode.changed` event.
pub async fn toggle_safe_mode(State(state): State<AppState>) -> Json<ToggleResponse> {
    let safe_mode = state.safety.toggle_safe_mode();
    info!(safe_mode, "safe mode toggled via api");

    let event = json!({
        "type": "safe_mode.changed",
        "safe_mode": safe_mode,
        "timestamp": Utc::now().to_rfc3339(),
    });
    state.notify_all(event);

    Json(ToggleResponse { safe_mode })
}
