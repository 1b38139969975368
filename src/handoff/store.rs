//! Handoff buffer — ephemeral keyed store decoupling the engine's webhook
//! from session polling.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::definition::AgentDefinition;

/// A buffered definition awaiting pickup.
#[derive(Debug, Clone)]
pub struct HandoffEntry {
    pub definition: AgentDefinition,
    pub stored_at: DateTime<Utc>,
}

/// Keyed store with overwrite-on-put and take-and-delete reads.
///
/// At most one live entry per session id. `take` removing the entry in the
/// same operation is what makes delivery to the provisioning chain
/// at-most-once even with competing pollers. Implementations are ephemeral;
/// consumers must tolerate `None` and keep polling within their own budget.
#[async_trait]
pub trait HandoffStore: Send + Sync {
    /// Store the entry for a session, overwriting any previous one.
    async fn put(&self, session_id: &str, definition: AgentDefinition);

    /// Atomically remove and return the entry, if present.
    async fn take(&self, session_id: &str) -> Option<AgentDefinition>;
}

/// In-memory implementation with lazy TTL expiry.
pub struct MemoryHandoffStore {
    entries: RwLock<HashMap<String, HandoffEntry>>,
    ttl: Duration,
}

impl MemoryHandoffStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    fn is_expired(&self, entry: &HandoffEntry) -> bool {
        Utc::now()
            .signed_duration_since(entry.stored_at)
            .to_std()
            .map(|elapsed| elapsed > self.ttl)
            .unwrap_or(false)
    }
}

#[async_trait]
impl HandoffStore for MemoryHandoffStore {
    async fn put(&self, session_id: &str, definition: AgentDefinition) {
        let mut entries = self.entries.write().await;
        entries.retain(|key, entry| {
            let keep = !self.is_expired(entry);
            if !keep {
                debug!(session_id = %key, "Dropped expired handoff entry");
            }
            keep
        });

        let entry = HandoffEntry {
            definition,
            stored_at: Utc::now(),
        };
        if let Some(prev) = entries.insert(session_id.to_string(), entry) {
            debug!(
                session_id,
                prev_agent = %prev.definition.name,
                "Overwrote buffered definition"
            );
        }
    }

    async fn take(&self, session_id: &str) -> Option<AgentDefinition> {
        let mut entries = self.entries.write().await;
        let entry = entries.remove(session_id)?;
        if self.is_expired(&entry) {
            debug!(session_id, "Dropped expired handoff entry");
            return None;
        }
        Some(entry.definition)
    }
}
