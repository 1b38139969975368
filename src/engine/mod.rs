//! Conversational engine boundary — pass-through proxy and reply
//! classification.

pub mod proxy;
pub mod reply;

pub use proxy::{EngineProxy, RateLimiter, SetupEngine};
pub use reply::{EngineReply, classify};
