//! Structured error type for the agent crate.
//!
//! Every variant carries typed context; most map one-to-one onto an
//! audit-log event or a user-visible error string from the dispatch
//! pipeline's six stages.

use thiserror::Error;

use crate::tools::ToolError;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BastionError {
    // --- Configuration / inventory ---
    #[error("configuration directory not found: {path}")]
    ConfigDirNotFound { path: String },

    #[error("failed to parse configuration: {0}")]
    ConfigParse(String),

    #[error("unknown server: {name}")]
    UnknownServer { name: String },

    #[error("unknown role: {role}")]
    UnknownRole { role: String },

    // --- Sanitizer ---
    #[error("input rejected: {reason}")]
    Sanitization { field: String, reason: String },

    // --- Allowlist ---
    #[error("operation not permitted by security policy: {detail}")]
    AllowlistDenied { detail: String, role: String },

    // --- Approval ---
    #[error("operation denied by operator")]
    ApprovalDenied,

    // --- Dispatch / tools ---
    #[error("unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("tool already registered: {name}")]
    DuplicateTool { name: String },

    #[error("operation timed out ({secs}s)")]
    Timeout { secs: u64 },

    #[error("execution failed: {0}")]
    ToolExecution(String),

    // --- Session lifecycle ---
    #[error("session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("cancelled by user")]
    CancelledByUser,

    // --- Transport ---
    #[error("another session is active")]
    SessionBusy,

    // --- Serialization / I/O / generic internal ---
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for BastionError {
    fn from(e: anyhow::Error) -> Self {
        BastionError::Internal(e.to_string())
    }
}

impl From<serde_json::Error> for BastionError {
    fn from(e: serde_json::Error) -> Self {
        BastionError::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for BastionError {
    fn from(e: std::io::Error) -> Self {
        BastionError::Io(e.to_string())
    }
}

impl From<ToolError> for BastionError {
    fn from(e: ToolError) -> Self {
        match e {
            ToolError::InvalidRequest(msg) => BastionError::ToolExecution(msg),
            ToolError::PermissionDenied(msg) => BastionError::AllowlistDenied {
                detail: msg,
                role: String::new(),
            },
            ToolError::Timeout { secs } => BastionError::Timeout { secs },
            ToolError::Other(e) => BastionError::Internal(e.to_string()),
        }
    }
}
