//! HTTP and WebSocket route handlers.
//!
//! [`api_routes`] is nested under `/api` by [`crate::HyphaServer::router`]
//! and sits behind the rate-limit middleware. The WebSocket upgrade route is
//! mounted separately and is not throttled.

pub mod agent;
pub mod chain;
pub mod safety;
pub mod ws;

use axum::Json;
use axum::Router;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde_json::json;
use thiserror::Error;

use crate::server::AppState;

/// Error body returned by API handlers: `{"error": "..."}`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed or out-of-bounds request.
    #[error("{0}")]
    BadRequest(String),
    /// Named resource does not exist.
    #[error("{0}")]
    NotFound(String),
    /// Dispatch is halted.
    #[error("{0}")]
    Unavailable(String),
    /// Handler failed.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Routes mounted under `/api`.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/core/status", get(safety::status))
        .route("/core/safe-mode/toggle", post(safety::toggle_safe_mode))
        .route("/chain/execute", post(chain::execute_agent_chain))
        .route("/plugins/chain", post(chain::execute_plugin_chain))
        .route("/agent/{name}/ask", post(agent::ask))
        .route("/ws/stats", get(ws::stats))
}
