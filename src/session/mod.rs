//! Setup sessions — models, orchestration, and the dashboard surface.

pub mod model;
pub mod orchestrator;
pub mod routes;

pub use model::{EphemeralCredentials, Sender, Session, Turn};
pub use orchestrator::{ProvisionGate, SessionOrchestrator, SessionPhase, SessionStatus};
pub use routes::{SessionRegistry, SessionRouteState, session_routes};
