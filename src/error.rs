//! Error types for the provisioning pipeline.

/// Top-level error type for the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Proxy error: {0}")]
    Proxy(#[from] ProxyError),

    #[error("Handoff error: {0}")]
    Handoff(#[from] HandoffError),

    #[error("Provisioning error: {0}")]
    Provision(#[from] ProvisionError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Failures at the conversational proxy boundary.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Rate limited for {identity}; retry later")]
    RateLimited { identity: String },

    #[error("Engine returned status {status}")]
    Upstream { status: u16 },

    #[error("Transport failure: {0}")]
    Transport(String),
}

/// Failures in the handoff pickup loop.
#[derive(Debug, thiserror::Error)]
pub enum HandoffError {
    #[error("No definition arrived for session {session_id} within {attempts} attempts")]
    Timeout { session_id: String, attempts: u32 },
}

/// Failures in the provisioning chain.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("Account registration failed: {reason}")]
    Registration { reason: String },

    #[error("Registration response carried no access token")]
    TokenMissing,

    #[error("Resource creation failed: {reason}")]
    ResourceCreation { reason: String },
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Result type alias for the pipeline.
pub type Result<T> = std::result::Result<T, Error>;
