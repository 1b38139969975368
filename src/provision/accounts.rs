//! Account registration client.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde_json::Value;

use crate::error::ProvisionError;
use crate::session::model::EphemeralCredentials;

/// The account service boundary as seen by the chain.
#[async_trait]
pub trait AccountService: Send + Sync {
    /// Register throwaway credentials; returns the raw registration payload.
    async fn register(
        &self,
        credentials: &EphemeralCredentials,
    ) -> Result<Value, ProvisionError>;
}

/// HTTP client for the external account/auth service.
pub struct AccountClient {
    client: reqwest::Client,
    register_url: String,
}

impl AccountClient {
    pub fn new(register_url: String) -> Self {
        Self {
            client: crate::http::client(),
            register_url,
        }
    }
}

#[async_trait]
impl AccountService for AccountClient {
    async fn register(
        &self,
        credentials: &EphemeralCredentials,
    ) -> Result<Value, ProvisionError> {
        let body = serde_json::json!({
            "email": credentials.email,
            "password": credentials.password.expose_secret(),
        });

        let response = self
            .client
            .post(&self.register_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProvisionError::Registration {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProvisionError::Registration {
                reason: format!("status {status}"),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| ProvisionError::Registration {
                reason: e.to_string(),
            })
    }
}

/// Extract the access token from a registration payload.
///
/// The account service answers with either `{access_token, ...}` or an
/// array-wrapped single object; both are accepted.
pub fn extract_token(payload: &Value) -> Option<String> {
    let obj = match payload {
        Value::Array(items) => items.first()?,
        other => other,
    };
    obj.get("access_token")
        .and_then(Value::as_str)
        .map(String::from)
}
