//! Content item shapes used when building a [`crate::tool_iface::ToolResponse`].

use serde::{Deserialize, Serialize};

/// A single content item returned by a tool call, mirroring the aggregator's
/// own content union.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    /// Plain text content.
    Text {
        /// The text payload.
        text: String,
    },
    /// Base64-encoded image content.
    Image {
        /// Base64-encoded image bytes.
        data: String,
        /// MIME type, e.g. `image/png`.
        mime_type: String,
    },
    /// Base64-encoded audio content.
    Audio {
        /// Base64-encoded audio bytes.
        data: String,
        /// MIME type, e.g. `audio/wav`.
        mime_type: String,
    },
    /// Opaque content the core does not further interpret.
    Other {
        /// Raw JSON value of the content item.
        value: serde_json::Value,
    },
}
