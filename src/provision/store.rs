//! Local session persistence — bearer token plus the route-protection cookie.

use tokio::sync::RwLock;

/// Cookie name checked by the route-protection middleware.
const COOKIE_NAME: &str = "staff_token";
/// Cookie lifetime — 7 days.
const COOKIE_MAX_AGE_SECS: u64 = 604_800;

/// Holds the session token for API calls and the rendered cookie for
/// middleware-level route protection. Both writes happen together; either
/// one missing degrades protected-route access later.
#[derive(Default)]
pub struct SessionTokenStore {
    token: RwLock<Option<String>>,
    cookie: RwLock<Option<String>>,
}

impl SessionTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the bearer token and render the matching cookie.
    pub async fn persist(&self, token: &str) {
        *self.token.write().await = Some(token.to_string());
        *self.cookie.write().await = Some(render_cookie(token));
    }

    /// Bearer token for API authorization headers, if one is stored.
    pub async fn bearer(&self) -> Option<String> {
        self.token.read().await.clone()
    }

    /// The `Set-Cookie` value for route protection, if a token is stored.
    pub async fn cookie(&self) -> Option<String> {
        self.cookie.read().await.clone()
    }
}

fn render_cookie(token: &str) -> String {
    format!("{COOKIE_NAME}={token}; path=/; max-age={COOKIE_MAX_AGE_SECS}; SameSite=Lax")
}
