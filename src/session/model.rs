//! Session and turn models for the guided setup conversation.

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;
use secrecy::SecretString;
use serde::Serialize;
use uuid::Uuid;

/// Who authored a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    User,
    Engine,
}

/// One message exchange in a setup conversation. Never mutated after
/// creation; transcript order is append order.
#[derive(Debug, Clone, Serialize)]
pub struct Turn {
    pub sender: Sender,
    pub text: String,
    /// Display only.
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::User,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn engine(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::Engine,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Throwaway account credentials minted for one session.
///
/// The password leaves the process only inside the engine and registration
/// payloads.
#[derive(Debug, Clone)]
pub struct EphemeralCredentials {
    pub email: String,
    pub password: SecretString,
}

impl EphemeralCredentials {
    /// Generate a fresh identifier/password pair.
    pub fn generate() -> Self {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(10)
            .map(char::from)
            .collect();
        let password: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(24)
            .map(char::from)
            .collect();

        Self {
            email: format!("staff-{}@setup.internal", suffix.to_lowercase()),
            password: SecretString::from(password),
        }
    }
}

/// One guided conversation attempt. The id keys the handoff buffer and
/// correlates turns on the engine side.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub credentials: EphemeralCredentials,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Open a fresh session with a new id and throwaway credentials.
    pub fn open() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            credentials: EphemeralCredentials::generate(),
            created_at: Utc::now(),
        }
    }
}
