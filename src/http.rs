//! Shared outbound HTTP client construction.

use std::time::Duration;

/// Build the standard outbound client with connect/request timeouts.
///
/// Falls back to the default client if the builder rejects the local TLS
/// configuration.
pub(crate) fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(5))
        .timeout(Duration::from_secs(30))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}
