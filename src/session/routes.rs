//! Dashboard-facing session surface — drives the in-process orchestrator.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::info;

use crate::config::PollerConfig;
use crate::engine::SetupEngine;
use crate::error::ProxyError;
use crate::handoff::HandoffStore;
use crate::provision::ProvisioningChain;
use crate::session::orchestrator::SessionOrchestrator;

/// Tracks live setup sessions and the collaborators a new one needs.
pub struct SessionRegistry {
    engine: Arc<dyn SetupEngine>,
    store: Arc<dyn HandoffStore>,
    chain: Arc<ProvisioningChain>,
    poller_config: PollerConfig,
    sessions: RwLock<HashMap<String, SessionOrchestrator>>,
}

impl SessionRegistry {
    pub fn new(
        engine: Arc<dyn SetupEngine>,
        store: Arc<dyn HandoffStore>,
        chain: Arc<ProvisioningChain>,
        poller_config: PollerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            engine,
            store,
            chain,
            poller_config,
            sessions: RwLock::new(HashMap::new()),
        })
    }

    /// Open a new session and return its id.
    pub async fn open(&self) -> String {
        let orchestrator = SessionOrchestrator::new(
            Arc::clone(&self.engine),
            Arc::clone(&self.store),
            Arc::clone(&self.chain),
            self.poller_config.clone(),
        );
        let id = orchestrator.session_id().await;
        self.sessions.write().await.insert(id.clone(), orchestrator);
        info!(session_id = %id, "Setup session opened");
        id
    }

    pub async fn get(&self, id: &str) -> Option<SessionOrchestrator> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Remove a session, stopping its poller.
    pub async fn close(&self, id: &str) -> bool {
        match self.sessions.write().await.remove(id) {
            Some(orchestrator) => {
                orchestrator.abandon().await;
                info!(session_id = %id, "Setup session abandoned");
                true
            }
            None => false,
        }
    }
}

/// Shared state for the session routes.
#[derive(Clone)]
pub struct SessionRouteState {
    pub registry: Arc<SessionRegistry>,
}

#[derive(Debug, Deserialize)]
struct TurnRequest {
    text: String,
}

/// POST /api/sessions
async fn open_session(State(state): State<SessionRouteState>) -> Response {
    let session_id = state.registry.open().await;
    (
        StatusCode::CREATED,
        Json(serde_json::json!({ "session_id": session_id })),
    )
        .into_response()
}

/// GET /api/sessions/{id}
async fn get_session(
    State(state): State<SessionRouteState>,
    Path(id): Path<String>,
) -> Response {
    match state.registry.get(&id).await {
        Some(orchestrator) => Json(orchestrator.status().await).into_response(),
        None => not_found(),
    }
}

/// POST /api/sessions/{id}/turns
///
/// Drives one turn and returns the updated status snapshot. Rate-limit
/// rejections surface as 429 so the dashboard can tell the user to slow
/// down instead of painting an error bubble.
async fn post_turn(
    State(state): State<SessionRouteState>,
    Path(id): Path<String>,
    Json(request): Json<TurnRequest>,
) -> Response {
    let text = request.text.trim();
    if text.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "text must not be empty" })),
        )
            .into_response();
    }

    let Some(orchestrator) = state.registry.get(&id).await else {
        return not_found();
    };

    match orchestrator.send_turn(text).await {
        Ok(()) => Json(orchestrator.status().await).into_response(),
        Err(ProxyError::RateLimited { .. }) => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({ "error": "rate limited; retry later" })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

/// DELETE /api/sessions/{id}
async fn close_session(
    State(state): State<SessionRouteState>,
    Path(id): Path<String>,
) -> Response {
    if state.registry.close(&id).await {
        Json(serde_json::json!({ "closed": true })).into_response()
    } else {
        not_found()
    }
}

/// GET /api/health
async fn health() -> Response {
    Json(serde_json::json!({ "status": "ok" })).into_response()
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": "unknown session" })),
    )
        .into_response()
}

/// Build the session REST routes.
pub fn session_routes(state: SessionRouteState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/sessions", post(open_session))
        .route(
            "/api/sessions/{id}",
            get(get_session).delete(close_session),
        )
        .route("/api/sessions/{id}/turns", post(post_turn))
        .with_state(state)
}
