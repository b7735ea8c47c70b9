//! The JSON-RPC dispatch.
//!
//! `POST /` accepts `{id, method, params}` and answers `{id, result}` on
//! success or `{id, error}` with a human-readable string otherwise. The
//! method set mirrors the read-only peer-protocol queries, so anything a
//! peer could learn over gossip is also available over HTTP.

use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::state::SharedState;

/// Request body for `POST /`.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    /// Echoed back verbatim in the response.
    #[serde(default)]
    pub id: Value,
    pub method: String,
    /// Positional parameters; only `GET_BLOCK` takes one.
    #[serde(default)]
    pub params: Vec<Value>,
}

pub async fn dispatch(
    State(state): State<SharedState>,
    Json(request): Json<RpcRequest>,
) -> Json<Value> {
    debug!("rpc call {}", request.method);

    let result = match request.method.as_str() {
        "GET_LATEST_BLOCK_ID" => Ok(json!({
            "latest_id": state.node.latest_block_id().await,
        })),

        "GET_BLOCK" => match request.params.first().and_then(Value::as_u64) {
            Some(block_id) => match state.node.get_block(block_id).await {
                Some(block) => Ok(json!({ "block": block })),
                None => Err(format!("no block with id {block_id}")),
            },
            None => Err("GET_BLOCK takes one non-negative integer parameter".to_string()),
        },

        "GET_PENDING_COIN_TXS" => Ok(json!({
            "pending_txs": state.node.pending_coin_txs().await,
        })),

        "GET_PENDING_PROOF_TXS" => Ok(json!({
            "pending_txs": state.node.pending_proof_txs().await,
        })),

        other => Err(format!("unknown method {other:?}")),
    };

    let response = match result {
        Ok(result) => json!({ "id": request.id, "result": result }),
        Err(error) => json!({ "id": request.id, "error": error }),
    };
    Json(response)
}
