//! Engine reply classification.
//!
//! The builder engine answers a turn with one of three shapes: a plain
//! conversational reply (`output` / `message` / `text`), a finished creation
//! payload, or an edit-completion marker. Payloads are sometimes
//! array-wrapped, and creation data may sit at the top level or under
//! `agentData`. The proxy never interprets any of this; classification
//! belongs to the session orchestrator.

use serde_json::Value;

use crate::definition::AgentDefinition;

/// What an engine reply turned out to be.
#[derive(Debug, Clone)]
pub enum EngineReply {
    /// Conversational text to show the user.
    Plain(String),
    /// A finished agent definition delivered inline.
    Creation(AgentDefinition),
    /// An edit-mode conversation finished; external state should be
    /// refreshed. This path never provisions.
    EditCompleted,
}

/// Classify an opaque reply payload.
pub fn classify(value: &Value) -> EngineReply {
    let inner = match value {
        Value::Array(items) => items.first().unwrap_or(&Value::Null),
        other => other,
    };

    if is_edit_marker(inner) {
        return EngineReply::EditCompleted;
    }

    if let Some(definition) = AgentDefinition::from_value(inner) {
        return EngineReply::Creation(definition);
    }
    if let Some(nested) = inner.get("agentData") {
        if let Some(definition) = AgentDefinition::from_value(nested) {
            return EngineReply::Creation(definition);
        }
    }

    EngineReply::Plain(reply_text(inner))
}

fn is_edit_marker(value: &Value) -> bool {
    value.get("_responseType").and_then(Value::as_str) == Some("agent_updated")
        || value.get("is_done").and_then(Value::as_bool) == Some(true)
}

/// Pull display text out of a plain reply.
fn reply_text(value: &Value) -> String {
    for key in ["output", "message", "text"] {
        if let Some(text) = value.get(key).and_then(Value::as_str) {
            return text.to_string();
        }
    }
    // Some engine nodes answer with a bare string.
    value
        .as_str()
        .map(String::from)
        .unwrap_or_else(|| value.to_string())
}
