//! Webhook surface for the engine's workflow runner.
//!
//! The runner cannot reply inline once a build finishes asynchronously, so it
//! POSTs the finished definition here keyed by session id. The session side
//! picks it up with a read-and-delete GET.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::definition::AgentDefinition;
use crate::handoff::HandoffStore;

/// Shared state for the handoff routes.
#[derive(Clone)]
pub struct HandoffRouteState {
    pub store: Arc<dyn HandoffStore>,
}

#[derive(Debug, Deserialize)]
struct TakeParams {
    session_id: String,
}

/// POST /api/handoff
///
/// Stores a finished definition under its session id, overwriting any
/// previous one. The workflow runner sometimes wraps the payload in a
/// single-element array; both shapes are accepted.
async fn put_handoff(
    State(state): State<HandoffRouteState>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let mut payload = match body {
        Value::Array(items) => match items.into_iter().next() {
            Some(Value::Object(map)) => map,
            _ => return bad_request("expected a definition object"),
        },
        Value::Object(map) => map,
        _ => return bad_request("expected a definition object"),
    };

    let Some(session_id) = payload
        .remove("session_id")
        .and_then(|v| v.as_str().map(String::from))
    else {
        return bad_request("missing session_id");
    };

    let Some(definition) = AgentDefinition::from_value(&Value::Object(payload)) else {
        return bad_request("definition needs a name and a system prompt");
    };

    info!(
        session_id = %session_id,
        agent = %definition.name,
        "Buffered definition from workflow webhook"
    );
    state.store.put(&session_id, definition).await;

    (StatusCode::OK, Json(serde_json::json!({ "stored": true })))
}

/// GET /api/handoff?session_id=...
///
/// Read-and-delete: the first caller gets the definition, everyone after
/// sees 404.
async fn take_handoff(
    State(state): State<HandoffRouteState>,
    Query(params): Query<TakeParams>,
) -> (StatusCode, Json<Value>) {
    match state.store.take(&params.session_id).await {
        Some(definition) => (StatusCode::OK, Json(serde_json::json!(definition))),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "no definition for this session" })),
        ),
    }
}

fn bad_request(message: &str) -> (StatusCode, Json<Value>) {
    warn!(message, "Rejected handoff webhook payload");
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": message })),
    )
}

/// Build the webhook routes.
pub fn handoff_routes(state: HandoffRouteState) -> Router {
    Router::new()
        .route("/api/handoff", post(put_handoff).get(take_handoff))
        .with_state(state)
}
