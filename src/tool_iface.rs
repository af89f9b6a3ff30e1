//! The two external interfaces the core consumes: whether a tool is
//! currently advertised by the aggregator, and how to call one.
//!
//! Grounded on the teacher's `Provider` trait (`name`, `list_tools`, `invoke`,
//! `health`) in `provider/mod.rs`: the core needs only the availability and
//! invocation surfaces of that trait, split into two narrower interfaces per
//! the "interface-polymorphic tool checker / caller" design note.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::Result;

/// Answers whether a named tool is currently advertised by the aggregator.
pub trait ToolAvailabilityOracle: Send + Sync {
    /// True if `tool_name` is currently advertised.
    fn is_available(&self, tool_name: &str) -> bool;

    /// All tool names currently advertised.
    fn list_available(&self) -> Vec<String>;
}

/// Invokes a named tool with a JSON argument map and returns its normalised
/// response envelope.
#[async_trait]
pub trait ToolCaller: Send + Sync {
    /// Call `tool_name` with `args`, returning the normalised envelope or a
    /// transport-level failure.
    async fn call(&self, tool_name: &str, args: Value) -> Result<ToolResponse>;
}

/// Normalised tool-response envelope per the aggregator's content-item
/// mapping convention: text/image/audio content items are flattened into
/// indexed fields, with everything else as `content`/`content_n`.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ToolResponse {
    /// Whether the aggregator considers the call to have succeeded.
    pub success: bool,
    /// Flattened fields: `text`, `text_1`, `image` + `image_mime_type`,
    /// `audio` + `audio_mime_type`, `content`, `content_n`, `meta`, ...
    #[serde(flatten)]
    pub fields: HashMap<String, Value>,
}

impl ToolResponse {
    /// Build a `ToolResponse` from a sequence of content items plus the
    /// envelope's success flag, per the teacher's `Content` enum shape.
    #[must_use]
    pub fn from_content(success: bool, items: &[crate::protocol::Content]) -> Self {
        let mut fields = HashMap::new();
        let mut text_idx = 0usize;
        let mut image_idx = 0usize;
        let mut audio_idx = 0usize;
        let mut content_idx = 0usize;

        for item in items {
            match item {
                crate::protocol::Content::Text { text } => {
                    let key = indexed_key("text", text_idx);
                    text_idx += 1;
                    fields.insert(key, Value::String(text.clone()));
                }
                crate::protocol::Content::Image { data, mime_type } => {
                    let key = indexed_key("image", image_idx);
                    let mime_key = indexed_key("image_mime_type", image_idx);
                    image_idx += 1;
                    fields.insert(key, Value::String(data.clone()));
                    fields.insert(mime_key, Value::String(mime_type.clone()));
                }
                crate::protocol::Content::Audio { data, mime_type } => {
                    let key = indexed_key("audio", audio_idx);
                    let mime_key = indexed_key("audio_mime_type", audio_idx);
                    audio_idx += 1;
                    fields.insert(key, Value::String(data.clone()));
                    fields.insert(mime_key, Value::String(mime_type.clone()));
                }
                crate::protocol::Content::Other { value } => {
                    let key = indexed_key("content", content_idx);
                    content_idx += 1;
                    fields.insert(key, value.clone());
                }
            }
        }

        Self { success, fields }
    }

    /// Shorthand for a failed envelope carrying a single text explanation.
    #[must_use]
    pub fn failure(text: impl Into<String>) -> Self {
        let mut fields = HashMap::new();
        fields.insert("text".to_string(), Value::String(text.into()));
        Self { success: false, fields }
    }

    /// The first text field (`text`), if present.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.fields.get("text").and_then(Value::as_str)
    }

    /// Evaluate a dotted path (no arrays, no wildcards) against the envelope
    /// treated as a JSON object, mirroring the teacher's `extract_path`.
    #[must_use]
    pub fn extract_path(&self, path: &str) -> Option<Value> {
        let mut current = Value::Object(self.fields.clone().into_iter().collect());
        for segment in path.split('.') {
            if segment.is_empty() {
                return None;
            }
            current = current.as_object()?.get(segment)?.clone();
        }
        Some(current)
    }
}

fn indexed_key(base: &str, idx: usize) -> String {
    if idx == 0 {
        base.to_string()
    } else {
        format!("{base}_{idx}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Content;
    use serde_json::json;

    #[test]
    fn flattens_multiple_text_items() {
        let response = ToolResponse::from_content(
            true,
            &[
                Content::Text { text: "first".into() },
                Content::Text { text: "second".into() },
            ],
        );
        assert_eq!(response.fields.get("text"), Some(&json!("first")));
        assert_eq!(response.fields.get("text_1"), Some(&json!("second")));
    }

    #[test]
    fn extract_path_traverses_dotted_keys() {
        let mut response = ToolResponse::failure("ignored");
        response.fields.insert(
            "content".to_string(),
            json!({"id": "svc-1", "status": {"phase": "running"}}),
        );
        assert_eq!(
            response.extract_path("content.status.phase"),
            Some(json!("running"))
        );
        assert_eq!(response.extract_path("content.missing"), None);
    }
}
