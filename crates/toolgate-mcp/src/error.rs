//! Error types for the MCP crate.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use thiserror::Error;

/// Stable name of a per-request failure, as reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    ValidationError,
    UnknownTool,
    UnknownResource,
    NotFound,
    AmbiguousPath,
    WritesDisabled,
    UpstreamError,
    Indeterminate,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ValidationError => "ValidationError",
            ErrorKind::UnknownTool => "UnknownTool",
            ErrorKind::UnknownResource => "UnknownResource",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::AmbiguousPath => "AmbiguousPath",
            ErrorKind::WritesDisabled => "WritesDisabled",
            ErrorKind::UpstreamError => "UpstreamError",
            ErrorKind::Indeterminate => "Indeterminate",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One violated parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    pub field: String,
    pub reason: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Parameter validation failure listing every violated field.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationError {
    pub violations: Vec<FieldViolation>,
}

impl ValidationError {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for a single violation.
    pub fn field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            violations: vec![FieldViolation::new(field, reason)],
        }
    }

    pub fn push(&mut self, field: impl Into<String>, reason: impl Into<String>) {
        self.violations.push(FieldViolation::new(field, reason));
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    /// Names of the violated fields, in the order they were found.
    pub fn fields(&self) -> Vec<&str> {
        self.violations.iter().map(|v| v.field.as_str()).collect()
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .violations
            .iter()
            .map(|v| format!("'{}' {}", v.field, v.reason))
            .collect();
        write!(f, "invalid parameters: {}", parts.join("; "))
    }
}

impl std::error::Error for ValidationError {}

/// Per-request failure of a tool call or resource read.
///
/// None of these stop the server; they are reported to the caller.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("unknown resource: {uri}")]
    UnknownResource { uri: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("path '{path}' is a directory, not a file")]
    AmbiguousPath { path: String },

    #[error(
        "{statement} is classified as a write and write operations are disabled; set DANGEROUSLY_ALLOW_WRITE_OPS=true to enable them"
    )]
    WritesDisabled { statement: String },

    #[error("{0}")]
    Upstream(String),

    #[error("outcome unknown: {0}")]
    Indeterminate(String),
}

impl ToolError {
    pub fn upstream(message: impl Into<String>) -> Self {
        ToolError::Upstream(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ToolError::NotFound(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ToolError::Validation(_) => ErrorKind::ValidationError,
            ToolError::UnknownTool { .. } => ErrorKind::UnknownTool,
            ToolError::UnknownResource { .. } => ErrorKind::UnknownResource,
            ToolError::NotFound(_) => ErrorKind::NotFound,
            ToolError::AmbiguousPath { .. } => ErrorKind::AmbiguousPath,
            ToolError::WritesDisabled { .. } => ErrorKind::WritesDisabled,
            ToolError::Upstream(_) => ErrorKind::UpstreamError,
            ToolError::Indeterminate(_) => ErrorKind::Indeterminate,
        }
    }

    /// Structured form returned to the host.
    pub fn to_payload(&self) -> Value {
        let mut error = json!({
            "kind": self.kind(),
            "message": self.to_string(),
        });
        if let ToolError::Validation(v) = self {
            error["fields"] = json!(v.violations);
        }
        json!({ "error": error })
    }
}

/// Missing or invalid startup configuration. Fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} is not set")]
    Missing { name: &'static str },

    #[error("invalid {name}: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("credential check failed: {0}")]
    CredentialRejected(String),

    #[error("cannot reach upstream: {0}")]
    Unreachable(String),
}

/// Errors of the server loop itself.
#[derive(Debug, Error)]
pub enum McpError {
    /// Failed to start the server.
    #[error("failed to start MCP server: {0}")]
    StartupFailed(String),

    /// Tool or resource registration conflict.
    #[error("duplicate registration: {0}")]
    Duplicate(String),

    /// Transport error.
    #[error("transport error: {0}")]
    TransportError(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
