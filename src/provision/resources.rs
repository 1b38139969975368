//! Resource creation client — turns a finished definition into a runtime
//! resource on the external resource service.

use async_trait::async_trait;
use serde_json::Value;

use crate::definition::AgentDefinition;
use crate::error::ProvisionError;

/// The resource service boundary as seen by the chain.
#[async_trait]
pub trait ResourceService: Send + Sync {
    /// Create the runtime resource for a definition.
    async fn create(
        &self,
        definition: &AgentDefinition,
        bearer_token: &str,
    ) -> Result<Value, ProvisionError>;
}

/// HTTP client for the external resource-creation service.
pub struct ResourceClient {
    client: reqwest::Client,
    create_url: String,
}

impl ResourceClient {
    pub fn new(create_url: String) -> Self {
        Self {
            client: crate::http::client(),
            create_url,
        }
    }
}

#[async_trait]
impl ResourceService for ResourceClient {
    async fn create(
        &self,
        definition: &AgentDefinition,
        bearer_token: &str,
    ) -> Result<Value, ProvisionError> {
        let response = self
            .client
            .post(&self.create_url)
            .bearer_auth(bearer_token)
            .json(definition)
            .send()
            .await
            .map_err(|e| ProvisionError::ResourceCreation {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProvisionError::ResourceCreation {
                reason: format!("status {status}"),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| ProvisionError::ResourceCreation {
                reason: e.to_string(),
            })
    }
}
