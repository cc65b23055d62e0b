//! Typed model of the agent's `stream-json` output.
//!
//! Each stdout line is one JSON object discriminated by `type`. Payload
//! fields vary between agent versions, so fields whose shape drifts are kept
//! as `serde_json::Value` and read through [`text_of`]. Numeric ids read as
//! strings; other scalar fields of the wrong type read as absent rather than
//! rejecting the record.
//! Unknown `type` values land in [`StreamRecord::Unknown`] instead of failing.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamRecord {
    /// Session init and other informational records.
    System {
        #[serde(default, deserialize_with = "lenient_string")]
        subtype: Option<String>,
        #[serde(default, deserialize_with = "lenient_string")]
        session_id: Option<String>,
        #[serde(default, deserialize_with = "lenient_string")]
        model: Option<String>,
    },
    /// Full assistant turn (`message.content` blocks), or a bare text event
    /// from older agents (`content` / `text`).
    Assistant {
        #[serde(default, deserialize_with = "lenient_envelope")]
        message: Option<Envelope>,
        #[serde(default)]
        content: Value,
        #[serde(default)]
        text: Value,
    },
    /// Echoed user turn; carries `tool_result` blocks.
    User {
        #[serde(default, deserialize_with = "lenient_envelope")]
        message: Option<Envelope>,
    },
    Text {
        #[serde(default)]
        text: Value,
        #[serde(default)]
        content: Value,
    },
    ContentBlockDelta {
        #[serde(default)]
        delta: Value,
    },
    /// Partial-message wrapper around a raw API stream event.
    StreamEvent {
        #[serde(default)]
        event: Value,
    },
    ToolUse {
        #[serde(default, deserialize_with = "lenient_string")]
        id: Option<String>,
        #[serde(default, alias = "tool", deserialize_with = "lenient_string")]
        name: Option<String>,
        #[serde(default)]
        input: Value,
    },
    ToolResult {
        #[serde(default, deserialize_with = "lenient_string")]
        tool_use_id: Option<String>,
        #[serde(default, alias = "tool", deserialize_with = "lenient_string")]
        name: Option<String>,
        #[serde(default, alias = "output")]
        content: Value,
        #[serde(default, deserialize_with = "lenient_bool")]
        is_error: bool,
    },
    Error {
        #[serde(default)]
        error: Value,
        #[serde(default)]
        message: Value,
    },
    Result {
        #[serde(default, deserialize_with = "lenient_string")]
        subtype: Option<String>,
        #[serde(default)]
        result: Value,
        #[serde(default)]
        content: Value,
        #[serde(default, deserialize_with = "lenient_bool")]
        is_error: bool,
    },
    #[serde(other)]
    Unknown,
}

/// `message` object of an assistant or user record.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub content: Value,
}

impl Envelope {
    /// Content blocks; a plain string counts as one text block and blocks
    /// that don't match a known shape are skipped.
    pub fn blocks(&self) -> Vec<ContentBlock> {
        match &self.content {
            Value::String(text) => vec![ContentBlock::Text { text: text.clone() }],
            Value::Array(items) => items
                .iter()
                .filter_map(|item| ContentBlock::deserialize(item).ok())
                .collect(),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        #[serde(default, deserialize_with = "lenient_text")]
        text: String,
    },
    ToolUse {
        #[serde(default, deserialize_with = "lenient_string")]
        id: Option<String>,
        #[serde(deserialize_with = "required_string")]
        name: String,
        #[serde(default)]
        input: Value,
    },
    ToolResult {
        #[serde(default, deserialize_with = "lenient_string")]
        tool_use_id: Option<String>,
        #[serde(default)]
        content: Value,
        #[serde(default, deserialize_with = "lenient_bool")]
        is_error: bool,
    },
    #[serde(other)]
    Other,
}

impl StreamRecord {
    /// Parses one line. `None` means the line is not a typed JSON record and
    /// should be shown as plain text.
    pub fn parse(line: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(line).ok()?;
        if !value.get("type").is_some_and(Value::is_string) {
            return None;
        }
        match StreamRecord::deserialize(&value) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::debug!(error = %e, "[StreamParser] record shape not recognised");
                None
            }
        }
    }
}

/// Extracts display text from a loosely shaped field.
///
/// Strings are returned as-is, arrays are concatenated, and objects are
/// searched for `text`, `content`, `message` and `delta` in that order.
pub fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(text_of).collect(),
        Value::Object(map) => ["text", "content", "message", "delta"]
            .iter()
            .filter_map(|key| map.get(*key))
            .map(text_of)
            .find(|s| !s.is_empty())
            .unwrap_or_default(),
        _ => String::new(),
    }
}

/// Strings as-is, numbers rendered; anything else is absent.
fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(lenient_string(deserializer)?.unwrap_or_default())
}

fn required_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    lenient_string(deserializer)?.ok_or_else(|| D::Error::custom("expected a string"))
}

/// Only a literal `true` counts.
fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(matches!(Value::deserialize(deserializer)?, Value::Bool(true)))
}

/// An object envelope, or a bare string taken as its text content.
fn lenient_envelope<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Envelope>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Object(mut map) => Some(Envelope {
            content: map.remove("content").unwrap_or(Value::Null),
        }),
        text @ Value::String(_) => Some(Envelope { content: text }),
        _ => None,
    })
}
