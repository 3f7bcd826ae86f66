use bytes::Bytes;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

/// A unit of work addressed to one device.
///
/// The dispatcher sends `{"task_token": "...", "smoothie": "..."}`. Only
/// `task_token` is required; `smoothie` is informational and any other field
/// is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Opaque correlation id chosen by the dispatcher. Echoed back unchanged.
    pub task_token: String,
    /// What the dispatcher asked the device to make, if it said.
    #[serde(default, deserialize_with = "string_or_none", skip_serializing_if = "Option::is_none")]
    pub smoothie: Option<String>,
}

impl Order {
    pub fn new(task_token: impl Into<String>, smoothie: Option<String>) -> Self {
        Self {
            task_token: task_token.into(),
            smoothie,
        }
    }

    /// Decodes an order from a JSON payload.
    pub fn decode(payload: &[u8]) -> Result<Self, serde_json::Error> {
        Self::from_value(serde_json::from_slice(payload)?)
    }

    /// Extracts an order from an already-parsed JSON document.
    ///
    /// Only a JSON object is an order. The derived decoder would also fill the
    /// fields from an array by position, so anything else is rejected first.
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        if !value.is_object() {
            return Err(serde_json::Error::custom(format!(
                "expected a JSON object, got {}",
                json_kind(&value)
            )));
        }
        serde_json::from_value(value)
    }

    pub fn encode(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

// A non-string `smoothie` is treated like any other unknown field.
fn string_or_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => Some(s),
        _ => None,
    })
}

/// The success notification a device publishes once an order's work is done.
///
/// Serialized as `{"TaskToken": "<token>"}` and nothing else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Completion {
    pub task_token: String,
}

impl Completion {
    pub fn new(task_token: impl Into<String>) -> Self {
        Self {
            task_token: task_token.into(),
        }
    }

    pub fn decode(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    pub fn encode(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }
}
