//! Handoff poller — bounded pickup loop for one session's definition.
//!
//! The workflow engine cannot push to the session side, so the session polls
//! the buffer on a fixed cadence until the definition lands, the caller stops
//! the poller, or the attempt budget is spent. A fixed interval is enough:
//! the producer delivers once, near-deterministically, after engine-side
//! processing.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::PollerConfig;
use crate::definition::AgentDefinition;
use crate::handoff::HandoffStore;

/// Handle to a running pickup loop.
///
/// Exactly one of the callbacks fires per run, unless [`HandoffPoller::stop`]
/// intervenes first, in which case neither does. The shutdown flag is checked
/// before every attempt and again before every callback, so a late timer fire
/// after `stop()` cannot invoke anything.
pub struct HandoffPoller {
    shutdown: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl HandoffPoller {
    /// Spawn the pickup loop for `session_id`.
    pub fn start<F, G>(
        store: Arc<dyn HandoffStore>,
        session_id: String,
        config: PollerConfig,
        on_found: F,
        on_timeout: G,
    ) -> Self
    where
        F: FnOnce(AgentDefinition) + Send + 'static,
        G: FnOnce() + Send + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);

        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(config.interval);
            // The first interval tick resolves immediately; consume it so
            // every attempt waits one full interval.
            tick.tick().await;

            for attempt in 1..=config.max_attempts {
                tick.tick().await;
                if flag.load(Ordering::Acquire) {
                    debug!(%session_id, attempt, "Poller stopped during wait");
                    return;
                }
                if let Some(definition) = store.take(&session_id).await {
                    if flag.load(Ordering::Acquire) {
                        // stop() raced the take; the session was already
                        // abandoned, so the consumed entry is discarded.
                        return;
                    }
                    info!(
                        %session_id,
                        attempt,
                        agent = %definition.name,
                        "Handoff definition picked up"
                    );
                    on_found(definition);
                    return;
                }
            }

            if !flag.load(Ordering::Acquire) {
                info!(
                    %session_id,
                    attempts = config.max_attempts,
                    "Handoff poll budget exhausted"
                );
                on_timeout();
            }
        });

        Self { shutdown, handle }
    }

    /// Stop the poller. Idempotent and safe after natural completion.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.handle.abort();
    }

    /// Whether the pickup loop has finished (found, timed out, or stopped).
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for HandoffPoller {
    fn drop(&mut self) {
        self.stop();
    }
}
