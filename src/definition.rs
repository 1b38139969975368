//! Agent definition — the structured output a setup conversation produces.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A finished agent definition emitted by the builder engine.
///
/// The engine is loose about shape: the system prompt may arrive flat or
/// nested under `config`, and creation payloads are sometimes wrapped in a
/// single-element array. [`AgentDefinition::from_value`] accepts all of
/// these; a parsed definition always carries a non-empty name and system
/// prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefinition {
    /// Display name of the agent to be provisioned.
    pub name: String,
    /// Task instructions for the runtime resource.
    pub system_prompt: String,
    /// Capability identifiers wired up at resource creation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mcp_tools: Vec<String>,
    /// Capabilities that need a separate external authorization step.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub google_tools: Vec<String>,
    /// Engine-supplied metadata passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AgentDefinition {
    /// Parse a definition from a loose engine payload.
    ///
    /// Accepts a bare object or a single-element array, a flat
    /// `system_prompt` or a nested `config.system_prompt`. Returns `None`
    /// unless both the name and a system prompt are present and non-empty.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = match value {
            Value::Array(items) => items.first()?.as_object()?,
            Value::Object(map) => map,
            _ => return None,
        };

        let name = obj.get("name")?.as_str()?.trim();
        let system_prompt = obj
            .get("system_prompt")
            .and_then(Value::as_str)
            .or_else(|| {
                obj.get("config")
                    .and_then(|c| c.get("system_prompt"))
                    .and_then(Value::as_str)
            })?
            .trim();

        if name.is_empty() || system_prompt.is_empty() {
            return None;
        }

        let extra = obj
            .iter()
            .filter(|(key, _)| !Self::is_known_field(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Some(Self {
            name: name.to_string(),
            system_prompt: system_prompt.to_string(),
            mcp_tools: string_list(obj, "mcp_tools"),
            google_tools: string_list(obj, "google_tools"),
            extra,
        })
    }

    fn is_known_field(key: &str) -> bool {
        matches!(
            key,
            "name" | "system_prompt" | "config" | "mcp_tools" | "google_tools"
        )
    }
}

fn string_list(obj: &Map<String, Value>, key: &str) -> Vec<String> {
    obj.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}
