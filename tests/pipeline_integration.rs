//! Integration tests for the provisioning pipeline over real HTTP.
//!
//! Each test spins up stub upstream services (engine, accounts, resources)
//! and the actual pipeline app on random ports, then exercises the webhook
//! and session contracts end to end.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;

use staff_setup::config::{PollerConfig, RateLimitConfig};
use staff_setup::engine::{EngineProxy, SetupEngine};
use staff_setup::handoff::{
    HandoffRouteState, HandoffStore, MemoryHandoffStore, handoff_routes,
};
use staff_setup::provision::{
    AccountClient, AccountService, ProvisioningChain, ResourceClient, ResourceService,
    SessionTokenStore,
};
use staff_setup::session::{SessionRegistry, SessionRouteState, session_routes};

/// Maximum time any wait inside a test is allowed to run.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Start an Axum router on a random port, return its base URL.
async fn spawn_server(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

#[derive(Clone)]
struct CounterState {
    calls: Arc<AtomicU32>,
    reply: Value,
}

async fn counted_reply(State(state): State<CounterState>, _body: Json<Value>) -> Json<Value> {
    state.calls.fetch_add(1, Ordering::SeqCst);
    Json(state.reply.clone())
}

struct TestApp {
    base: String,
    client: reqwest::Client,
    account_calls: Arc<AtomicU32>,
    resource_calls: Arc<AtomicU32>,
}

impl TestApp {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn open_session(&self) -> String {
        let body: Value = self
            .client
            .post(self.url("/api/sessions"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        body["session_id"].as_str().unwrap().to_string()
    }

    async fn status(&self, session_id: &str) -> Value {
        self.client
            .get(self.url(&format!("/api/sessions/{session_id}")))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }

    async fn wait_for_phase(&self, session_id: &str, phase: &str) -> Value {
        timeout(TEST_TIMEOUT, async {
            loop {
                let status = self.status(session_id).await;
                if status["phase"] == phase {
                    return status;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("session never reached phase {phase}"))
    }
}

/// Spin up stub upstreams plus the real pipeline app.
async fn spawn_pipeline(
    engine_reply: Value,
    poller: PollerConfig,
    rate_limit: RateLimitConfig,
) -> TestApp {
    let account_calls = Arc::new(AtomicU32::new(0));
    let resource_calls = Arc::new(AtomicU32::new(0));

    let engine_url = spawn_server(Router::new().route("/chat", post(counted_reply)).with_state(
        CounterState {
            calls: Arc::new(AtomicU32::new(0)),
            reply: engine_reply,
        },
    ))
    .await;
    let account_url = spawn_server(
        Router::new()
            .route("/register", post(counted_reply))
            .with_state(CounterState {
                calls: Arc::clone(&account_calls),
                reply: json!([{ "access_token": "tok-123" }]),
            }),
    )
    .await;
    let resource_url = spawn_server(
        Router::new()
            .route("/resources", post(counted_reply))
            .with_state(CounterState {
                calls: Arc::clone(&resource_calls),
                reply: json!({ "id": "res-1" }),
            }),
    )
    .await;

    let store: Arc<dyn HandoffStore> = Arc::new(MemoryHandoffStore::new(Duration::from_secs(60)));
    let engine: Arc<dyn SetupEngine> =
        Arc::new(EngineProxy::new(format!("{engine_url}/chat"), rate_limit));
    let accounts: Arc<dyn AccountService> =
        Arc::new(AccountClient::new(format!("{account_url}/register")));
    let resources: Arc<dyn ResourceService> =
        Arc::new(ResourceClient::new(format!("{resource_url}/resources")));
    let chain = Arc::new(ProvisioningChain::new(
        accounts,
        resources,
        Arc::new(SessionTokenStore::new()),
    ));
    let registry = SessionRegistry::new(engine, Arc::clone(&store), chain, poller);

    let app = handoff_routes(HandoffRouteState { store })
        .merge(session_routes(SessionRouteState { registry }));
    let base = spawn_server(app).await;

    TestApp {
        base,
        client: reqwest::Client::new(),
        account_calls,
        resource_calls,
    }
}

fn fast_poller() -> PollerConfig {
    PollerConfig {
        interval: Duration::from_millis(20),
        max_attempts: 100,
    }
}

fn open_rate_limit() -> RateLimitConfig {
    RateLimitConfig {
        max_requests: 100,
        window: Duration::from_secs(60),
    }
}

#[tokio::test]
async fn webhook_delivery_provisions_exactly_once() {
    let app = spawn_pipeline(
        json!({ "output": "Baik, sedang saya proses ya" }),
        fast_poller(),
        open_rate_limit(),
    )
    .await;

    let session_id = app.open_session().await;

    // First turn: conversational reply only, no provisioning yet.
    let status: Value = app
        .client
        .post(app.url(&format!("/api/sessions/{session_id}/turns")))
        .json(&json!({ "text": "Saya mau buat Agent AI" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["phase"], "idle");
    assert_eq!(status["turns"].as_array().unwrap().len(), 2);
    assert!(status.get("report").is_none());
    assert_eq!(app.account_calls.load(Ordering::SeqCst), 0);

    // The workflow runner delivers the finished definition out-of-band.
    let response = app
        .client
        .post(app.url("/api/handoff"))
        .json(&json!([{
            "name": "Asdos Bot",
            "system_prompt": "Jawab soal kuliah",
            "mcp_tools": ["calendar"],
            "session_id": session_id,
        }]))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    // The poller picks it up and the chain runs exactly once.
    let status = app.wait_for_phase(&session_id, "done").await;
    assert_eq!(status["report"]["token"], "tok-123");
    assert_eq!(status["report"]["resource_created"], true);
    assert_eq!(status["report"]["destination"], "/workspace");

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(app.account_calls.load(Ordering::SeqCst), 1);
    assert_eq!(app.resource_calls.load(Ordering::SeqCst), 1);

    // The buffer entry was consumed by the poller.
    let response = app
        .client
        .get(app.url(&format!("/api/handoff?session_id={session_id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn handoff_webhook_is_read_and_delete() {
    let app = spawn_pipeline(json!({ "output": "ok" }), fast_poller(), open_rate_limit()).await;

    let response = app
        .client
        .post(app.url("/api/handoff"))
        .json(&json!({
            "name": "Solo",
            "config": { "system_prompt": "Hi" },
            "session_id": "detached-session",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let response = app
        .client
        .get(app.url("/api/handoff?session_id=detached-session"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["name"], "Solo");
    assert_eq!(body["system_prompt"], "Hi");

    // Second read misses: the first one deleted the entry.
    let response = app
        .client
        .get(app.url("/api/handoff?session_id=detached-session"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn inline_creation_reply_wins_the_race() {
    let app = spawn_pipeline(
        json!({
            "agentData": {
                "name": "Asdos Bot",
                "system_prompt": "Jawab soal kuliah",
            },
        }),
        fast_poller(),
        open_rate_limit(),
    )
    .await;

    let session_id = app.open_session().await;
    let status: Value = app
        .client
        .post(app.url(&format!("/api/sessions/{session_id}/turns")))
        .json(&json!({ "text": "buatkan sekarang" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(status["phase"], "done");
    assert_eq!(status["report"]["token"], "tok-123");
    assert_eq!(app.account_calls.load(Ordering::SeqCst), 1);
    assert_eq!(app.resource_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn rate_limit_surfaces_as_429() {
    let app = spawn_pipeline(
        json!({ "output": "ok" }),
        fast_poller(),
        RateLimitConfig {
            max_requests: 1,
            window: Duration::from_secs(60),
        },
    )
    .await;

    let session_id = app.open_session().await;
    let first = app
        .client
        .post(app.url(&format!("/api/sessions/{session_id}/turns")))
        .json(&json!({ "text": "halo" }))
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), 200);

    let second = app
        .client
        .post(app.url(&format!("/api/sessions/{session_id}/turns")))
        .json(&json!({ "text": "masih ada?" }))
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), 429);
}

#[tokio::test]
async fn poll_budget_exhaustion_surfaces_timeout() {
    let app = spawn_pipeline(
        json!({ "output": "sebentar ya" }),
        PollerConfig {
            interval: Duration::from_millis(10),
            max_attempts: 3,
        },
        open_rate_limit(),
    )
    .await;

    let session_id = app.open_session().await;
    app.client
        .post(app.url(&format!("/api/sessions/{session_id}/turns")))
        .json(&json!({ "text": "buatkan" }))
        .send()
        .await
        .unwrap();

    let status = app.wait_for_phase(&session_id, "timed_out").await;
    let turns = status["turns"].as_array().unwrap();
    let last = turns.last().unwrap();
    assert_eq!(last["sender"], "engine");
    assert!(
        last["text"]
            .as_str()
            .unwrap()
            .contains("taking longer than expected")
    );
    assert_eq!(app.account_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unknown_session_is_404() {
    let app = spawn_pipeline(json!({ "output": "ok" }), fast_poller(), open_rate_limit()).await;

    let response = app
        .client
        .get(app.url("/api/sessions/nope"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    let response = app
        .client
        .post(app.url("/api/sessions/nope/turns"))
        .json(&json!({ "text": "halo" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn closing_a_session_stops_its_pipeline() {
    let app = spawn_pipeline(json!({ "output": "ok" }), fast_poller(), open_rate_limit()).await;

    let session_id = app.open_session().await;
    app.client
        .post(app.url(&format!("/api/sessions/{session_id}/turns")))
        .json(&json!({ "text": "halo" }))
        .send()
        .await
        .unwrap();

    let response = app
        .client
        .delete(app.url(&format!("/api/sessions/{session_id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    // A webhook for the closed session is buffered but never provisioned.
    app.client
        .post(app.url("/api/handoff"))
        .json(&json!({
            "name": "Late",
            "system_prompt": "too late",
            "session_id": session_id,
        }))
        .send()
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(app.account_calls.load(Ordering::SeqCst), 0);

    let response = app
        .client
        .get(app.url(&format!("/api/sessions/{session_id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}
