//! Chain execution endpoints.
//!
//! Both endpoints take the same body and return the same shape; they differ
//! only in which executor runs the steps.

use std::time::Instant;

use axum::Json;
use axum::extract::State;
use chrono::{DateTime, Utc};
use hypha_chain::{ChainExecutor, ChainHistory, ChainStep};
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::info;
use uuid::Uuid;

use super::ApiError;
use crate::metrics::{CHAIN_RUNS_TOTAL, CHAIN_RUN_DURATION_SECONDS};
use crate::server::AppState;

/// Chain request body.
#[derive(Debug, Deserialize)]
pub struct ChainRequest {
    /// Steps to run, in order.
    pub chain: Vec<ChainStep>,
    /// Caller-supplied context, logged but not interpreted.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Chain response body.
#[derive(Debug, Serialize)]
pub struct ChainResponse {
    /// Unique id for this run.
    pub request_id: String,
    /// When the run started.
    pub timestamp: DateTime<Utc>,
    /// The submitted steps.
    pub chain: Vec<ChainStep>,
    /// One result per step, in order.
    pub results: ChainHistory,
    /// Wall time of the run in seconds.
    pub execution_time: f64,
}

/// `POST /api/chain/execute`
pub async fn execute_agent_chain(
    State(state): State<AppState>,
    Json(request): Json<ChainRequest>,
) -> Result<Json<ChainResponse>, ApiError> {
    run_chain(&state, state.agents.as_ref(), request)
        .await
        .map(Json)
}

/// `POST /api/plugins/chain`
pub async fn execute_plugin_chain(
    State(state): State<AppState>,
    Json(request): Json<ChainRequest>,
) -> Result<Json<ChainResponse>, ApiError> {
    run_chain(&state, state.plugins.as_ref(), request)
        .await
        .map(Json)
}

async fn run_chain(
    state: &AppState,
    executor: &dyn ChainExecutor,
    request: ChainRequest,
) -> Result<ChainResponse, ApiError> {
    if request.chain.is_empty() {
        return Err(ApiError::BadRequest(
            "chain must contain at least one step".into(),
        ));
    }

    let request_id = Uuid::now_v7().to_string();
    let timestamp = Utc::now();
    let kind = executor.kind();
    let start = Instant::now();

    let results = executor
        .run(request.chain.clone())
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let execution_time = start.elapsed().as_secs_f64();
    let failed = results.iter().filter(|r| !r.is_success()).count();
    counter!(CHAIN_RUNS_TOTAL, "kind" => kind).increment(1);
    histogram!(CHAIN_RUN_DURATION_SECONDS, "kind" => kind).record(execution_time);
    info!(
        request_id = %request_id,
        kind,
        steps = results.len(),
        failed,
        metadata_keys = request.metadata.len(),
        "chain completed"
    );

    state.notify_all(json!({
        "type": "chain.completed",
        "request_id": request_id,
        "kind": kind,
        "steps": results.len(),
        "failed": failed,
        "timestamp": Utc::now().to_rfc3339(),
    }));

    Ok(ChainResponse {
        request_id,
        timestamp,
        chain: request.chain,
        results,
        execution_time,
    })
}
