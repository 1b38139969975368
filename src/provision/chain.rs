//! Provisioning chain — the dependency-ordered steps that turn a finished
//! definition into a usable account and resource.
//!
//! A later step's failure never rolls back an earlier one, and only
//! registration failure aborts. The product favors landing the user in the
//! workspace over transactional provisioning, so non-fatal failures are
//! logged, recorded in the report, and the chain keeps going.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::definition::AgentDefinition;
use crate::error::ProvisionError;
use crate::provision::accounts::{AccountService, extract_token};
use crate::provision::resources::ResourceService;
use crate::provision::store::SessionTokenStore;
use crate::session::model::EphemeralCredentials;

/// Route of the authenticated landing screen.
pub const LANDING_ROUTE: &str = "/workspace";

/// Outcome of one chain run.
#[derive(Debug, Clone, Serialize)]
pub struct ChainReport {
    /// Bearer token, when registration yielded one. `None` means a degraded
    /// landing: the user appears logged out and re-authenticates normally.
    pub token: Option<String>,
    /// Whether the runtime resource was created. Downstream screens handle
    /// "no resource yet".
    pub resource_created: bool,
    /// Route the user is sent to.
    pub destination: String,
    /// Non-fatal failures encountered along the way.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<String>,
}

/// Runs the post-definition steps in dependency order.
pub struct ProvisioningChain {
    accounts: Arc<dyn AccountService>,
    resources: Arc<dyn ResourceService>,
    tokens: Arc<SessionTokenStore>,
}

impl ProvisioningChain {
    pub fn new(
        accounts: Arc<dyn AccountService>,
        resources: Arc<dyn ResourceService>,
        tokens: Arc<SessionTokenStore>,
    ) -> Self {
        Self {
            accounts,
            resources,
            tokens,
        }
    }

    /// Run the chain once for a session's definition.
    ///
    /// Only registration failure is fatal. A missing token skips resource
    /// creation; a resource failure is recorded and the user still lands.
    pub async fn run(
        &self,
        session_id: &str,
        credentials: &EphemeralCredentials,
        definition: &AgentDefinition,
    ) -> Result<ChainReport, ProvisionError> {
        info!(session_id, agent = %definition.name, "Provisioning started");

        let registration = match self.accounts.register(credentials).await {
            Ok(payload) => payload,
            Err(e) => {
                error!(session_id, error = %e, "Account registration failed");
                return Err(e);
            }
        };

        let mut failures = Vec::new();

        let token = extract_token(&registration);
        match &token {
            Some(token) => self.tokens.persist(token).await,
            None => {
                warn!(session_id, "Registration response carried no access token");
                failures.push(ProvisionError::TokenMissing.to_string());
            }
        }

        let mut resource_created = false;
        if let Some(token) = &token {
            match self.resources.create(definition, token).await {
                Ok(resource) => {
                    debug!(session_id, resource = %resource, "Resource created");
                    resource_created = true;
                }
                Err(e) => {
                    // The user is not stranded in the conversation over a
                    // resource failure; the workspace handles its absence.
                    error!(session_id, error = %e, "Resource creation failed");
                    failures.push(e.to_string());
                }
            }
        }

        info!(
            session_id,
            resource_created,
            destination = LANDING_ROUTE,
            "Provisioning finished"
        );
        Ok(ChainReport {
            token,
            resource_created,
            destination: LANDING_ROUTE.to_string(),
            failures,
        })
    }
}
