//! Single-task invocation.

use axum::Json;
use axum::extract::{Path, State};
use hypha_chain::HALTED_OUTPUT;
use hypha_chain::tracking::tracked_invoke;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::ApiError;
use crate::server::AppState;

/// `POST /api/agent/{name}/ask` body.
#[derive(Debug, Deserialize)]
pub struct AskRequest {
    /// Prompt handed to the task.
    pub prompt: String,
}

/// `POST /api/agent/{name}/ask` response.
#[derive(Debug, Serialize)]
pub struct AskResponse {
    /// Task name as requested.
    pub agent: String,
    /// Task output.
    pub response: String,
}

/// `POST /api/agent/{name}/ask`
pub async fn ask(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AskResponse>, ApiError> {
    if !state.safety.is_operational() {
        return Err(ApiError::Unavailable(HALTED_OUTPUT.into()));
    }
    if request.prompt.trim().is_empty() {
        return Err(ApiError::BadRequest("prompt must not be empty".into()));
    }
    let max = state.config.max_payload_chars;
    if request.prompt.chars().count() > max {
        return Err(ApiError::BadRequest(format!(
            "prompt exceeds {max} characters"
        )));
    }

    let handler = state
        .tasks
        .resolve(&name)
        .ok_or_else(|| ApiError::NotFound(format!("agent '{name}' not found")))?;

    let response = tracked_invoke(&name.to_lowercase(), handler.as_ref(), &request.prompt)
        .await
        .map_err(|e| {
            warn!(task = %name, error = %e, "ask failed");
            ApiError::Internal(format!("agent '{name}' failed to respond"))
        })?;

    info!(task = %name, "ask completed");
    Ok(Json(AskResponse {
        agent: name,
        response,
    }))
}
