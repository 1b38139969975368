//! Configuration types.

use std::time::Duration;

/// Handoff poller cadence and budget.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Fixed interval between pickup attempts.
    pub interval: Duration,
    /// Maximum number of pickup attempts before reporting a timeout.
    pub max_attempts: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_attempts: 120, // ~4 minutes
        }
    }
}

/// Sliding-window rate limit applied per caller identity on the engine proxy.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests allowed inside one rolling window.
    pub max_requests: usize,
    /// Window length.
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 20,
            window: Duration::from_secs(60),
        }
    }
}

/// Endpoints of the external collaborators.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Conversational agent-builder engine.
    pub engine_url: String,
    /// Account registration endpoint.
    pub account_url: String,
    /// Runtime resource creation endpoint.
    pub resource_url: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            engine_url: "http://localhost:5678/webhook/agent-builder".to_string(),
            account_url: "http://localhost:9000/auth/register".to_string(),
            resource_url: "http://localhost:9100/resources".to_string(),
        }
    }
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub poller: PollerConfig,
    pub rate_limit: RateLimitConfig,
    pub upstream: UpstreamConfig,
    /// How long a buffered definition stays alive before lazy expiry.
    pub handoff_ttl: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            poller: PollerConfig::default(),
            rate_limit: RateLimitConfig::default(),
            upstream: UpstreamConfig::default(),
            handoff_ttl: Duration::from_secs(600), // comfortably past the poll budget
        }
    }
}
