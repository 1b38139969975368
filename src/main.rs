use std::sync::Arc;
use std::time::Duration;

use tower_http::cors::CorsLayer;
use tracing::info;

use staff_setup::config::PipelineConfig;
use staff_setup::engine::{EngineProxy, SetupEngine};
use staff_setup::handoff::{
    HandoffRouteState, HandoffStore, MemoryHandoffStore, handoff_routes,
};
use staff_setup::provision::{
    AccountClient, AccountService, ProvisioningChain, ResourceClient, ResourceService,
    SessionTokenStore,
};
use staff_setup::session::{SessionRegistry, SessionRouteState, session_routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let mut config = PipelineConfig::default();
    if let Ok(url) = std::env::var("STAFF_SETUP_ENGINE_URL") {
        config.upstream.engine_url = url;
    }
    if let Ok(url) = std::env::var("STAFF_SETUP_ACCOUNT_URL") {
        config.upstream.account_url = url;
    }
    if let Ok(url) = std::env::var("STAFF_SETUP_RESOURCE_URL") {
        config.upstream.resource_url = url;
    }
    if let Ok(secs) = std::env::var("STAFF_SETUP_POLL_INTERVAL_SECS") {
        config.poller.interval = Duration::from_secs(secs.parse().unwrap_or(2));
    }
    if let Ok(attempts) = std::env::var("STAFF_SETUP_POLL_MAX_ATTEMPTS") {
        config.poller.max_attempts = attempts.parse().unwrap_or(120);
    }

    let port: u16 = std::env::var("STAFF_SETUP_PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse()
        .unwrap_or(8080);

    eprintln!("🧩 Staff Setup v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Engine:   {}", config.upstream.engine_url);
    eprintln!("   Accounts: {}", config.upstream.account_url);
    eprintln!("   Webhook:  http://0.0.0.0:{port}/api/handoff");
    eprintln!("   Sessions: http://0.0.0.0:{port}/api/sessions\n");

    // ── Pipeline components ─────────────────────────────────────────────
    let store: Arc<dyn HandoffStore> = Arc::new(MemoryHandoffStore::new(config.handoff_ttl));
    let engine: Arc<dyn SetupEngine> = Arc::new(EngineProxy::new(
        config.upstream.engine_url.clone(),
        config.rate_limit.clone(),
    ));
    let accounts: Arc<dyn AccountService> =
        Arc::new(AccountClient::new(config.upstream.account_url.clone()));
    let resources: Arc<dyn ResourceService> =
        Arc::new(ResourceClient::new(config.upstream.resource_url.clone()));
    let tokens = Arc::new(SessionTokenStore::new());
    let chain = Arc::new(ProvisioningChain::new(accounts, resources, tokens));

    let registry = SessionRegistry::new(engine, Arc::clone(&store), chain, config.poller.clone());

    // The webhook is called by the workflow runner, the session surface by
    // browser dashboards, so CORS stays permissive here.
    let app = handoff_routes(HandoffRouteState { store })
        .merge(session_routes(SessionRouteState { registry }))
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "Staff Setup pipeline listening");
    axum::serve(listener, app).await?;

    Ok(())
}
