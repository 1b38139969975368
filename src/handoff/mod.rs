//! Handoff buffer, webhook surface, and pickup poller.
//!
//! Finished agent definitions arrive out-of-band from the engine's workflow
//! runner. They land in an ephemeral keyed buffer via webhook and the session
//! side polls them out with take-and-delete reads, which keeps delivery to
//! the provisioning chain at-most-once even when pollers compete.

pub mod poller;
pub mod routes;
pub mod store;

pub use poller::HandoffPoller;
pub use routes::{HandoffRouteState, handoff_routes};
pub use store::{HandoffEntry, HandoffStore, MemoryHandoffStore};
