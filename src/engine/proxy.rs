//! Conversational proxy — forwards setup-chat turns to the builder engine.
//!
//! A pure pass-through: the reply body stays opaque JSON and interpretation
//! belongs to the session orchestrator. The proxy only applies a per-identity
//! rate limit and normalizes failures.

use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::warn;

use crate::config::RateLimitConfig;
use crate::error::ProxyError;
use crate::session::model::EphemeralCredentials;

/// The engine boundary as seen by the orchestrator.
#[async_trait]
pub trait SetupEngine: Send + Sync {
    /// Forward one turn and return the engine's reply untouched.
    async fn send_turn(
        &self,
        session_id: &str,
        text: &str,
        credentials: &EphemeralCredentials,
    ) -> Result<Value, ProxyError>;
}

/// Sliding-window request counter keyed by caller identity.
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: Mutex<HashMap<String, Vec<Instant>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Record a request for `identity`. Returns `false` when over the limit,
    /// in which case the request is not counted.
    pub async fn check(&self, identity: &str) -> bool {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        let hits = windows.entry(identity.to_string()).or_default();
        hits.retain(|hit| now.duration_since(*hit) < self.config.window);
        if hits.len() >= self.config.max_requests {
            return false;
        }
        hits.push(now);
        true
    }
}

/// HTTP pass-through to the external agent-builder engine.
pub struct EngineProxy {
    client: reqwest::Client,
    engine_url: String,
    limiter: RateLimiter,
}

impl EngineProxy {
    pub fn new(engine_url: String, rate_limit: RateLimitConfig) -> Self {
        Self {
            client: crate::http::client(),
            engine_url,
            limiter: RateLimiter::new(rate_limit),
        }
    }
}

#[async_trait]
impl SetupEngine for EngineProxy {
    async fn send_turn(
        &self,
        session_id: &str,
        text: &str,
        credentials: &EphemeralCredentials,
    ) -> Result<Value, ProxyError> {
        if !self.limiter.check(&credentials.email).await {
            warn!(identity = %credentials.email, "Rate limit exceeded for setup chat");
            return Err(ProxyError::RateLimited {
                identity: credentials.email.clone(),
            });
        }

        let body = serde_json::json!({
            "session_id": session_id,
            "text": text,
            "credentials": {
                "email": credentials.email,
                "password": credentials.password.expose_secret(),
            },
        });

        let response = self
            .client
            .post(&self.engine_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProxyError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProxyError::Upstream {
                status: status.as_u16(),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| ProxyError::Transport(e.to_string()))
    }
}
