//! Error types for the capability & service orchestration core

use thiserror::Error;

/// Result type alias for the core
pub type Result<T> = std::result::Result<T, Error>;

/// Core error categories
#[derive(Error, Debug)]
pub enum Error {
    /// Definition or instance not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate definition name or instance label
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// One or more aggregated field validation errors
    #[error("validation failed: {}", .0.join("; "))]
    ValidationFailure(Vec<String>),

    /// A referenced tool is not currently advertised by the aggregator
    #[error("tool not available: {0}")]
    NotAvailable(String),

    /// Unbound template variable or non-stringifiable value
    #[error("template error: {0}")]
    TemplateFailure(String),

    /// The tool call itself failed at the transport level
    #[error("transport error calling '{tool}': {message}")]
    TransportFailure {
        /// Tool that was being called
        tool: String,
        /// Underlying error message
        message: String,
    },

    /// The tool responded with `success: false`
    #[error("tool '{tool}' rejected the call: {message}")]
    ToolRejection {
        /// Tool that rejected the call
        tool: String,
        /// Text extracted from the response content
        message: String,
    },

    /// Operation was cancelled before completion
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// Operation exceeded its deadline
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Configuration error (layered root discovery, storage root, etc.)
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error from the filesystem storage collaborator
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML (de)serialisation error
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON (de)serialisation error
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A background task panicked or was aborted before completion
    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Internal invariant violation
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Construct a validation failure from a single message
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationFailure(vec![message.into()])
    }
}

