use axum::{extract::State, Json};
use serde::Serialize;

use crate::state::SharedState;

/// Response body for `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub latest_block_id: u64,
}

/// Liveness probe that also reports the local chain height.
pub async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        latest_block_id: state.node.latest_block_id().await,
    })
}
