//! Tool trait and execution context shared by every built-in tool.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use bastion_core::Tool as ToolSchema;

/// Unified error type for all tools.
///
/// A tool's `execute`/`call` should only ever return this for conditions
/// the dispatch kernel needs to react to specially (timeout, permission);
/// everything else — a non-zero exit code, stderr output — belongs in
/// the `ToolResult` body, not here.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("operation timed out ({secs}s)")]
    Timeout { secs: u64 },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Context handed to a tool at call time: the server inventory lookup
/// and per-call timeout live here, not on the tool itself, so tools stay
/// stateless and swappable.
pub struct ToolContext<'a> {
    pub inventory: &'a crate::inventory::Inventory,
    pub command_timeout_secs: u64,
    pub ssh_connect_timeout_secs: u64,
}

/// A named, schema-declared operation exposed to the LLM collaborator.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn definition(&self) -> ToolSchema;

    /// Execute with sanitized, authorized input. Must never return `Err`
    /// for a user-visible failure — those are encoded in the returned
    /// `ToolResult`'s `error`/`exit_code` fields instead.
    async fn execute(&self, args: &Value, ctx: &ToolContext<'_>) -> Result<ToolResult, ToolError>;
}

/// The uniform result every tool produces.
///
/// Invariant: `success() == (exit_code == 0 && error.is_empty())`.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct ToolResult {
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub exit_code: i32,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        ToolResult {
            output: output.into(),
            error: String::new(),
            exit_code: 0,
        }
    }

    pub fn failed(error: impl Into<String>, exit_code: i32) -> Self {
        ToolResult {
            output: String::new(),
            error: error.into(),
            exit_code,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0 && self.error.is_empty()
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "output": self.output,
            "error": self.error,
            "exit_code": self.exit_code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_result_law_holds_for_success() {
        let r = ToolResult::ok("hi");
        assert!(r.success());
    }

    #[test]
    fn tool_result_law_holds_for_failure() {
        let r = ToolResult::failed("boom", 1);
        assert!(!r.success());
        let r2 = ToolResult {
            output: String::new(),
            error: String::new(),
            exit_code: 2,
        };
        assert!(!r2.success());
    }

    #[test]
    fn to_value_always_has_output_and_exit_code() {
        let r = ToolResult::ok("hi");
        let v = r.to_value();
        assert!(v.get("output").is_some());
        assert!(v.get("exit_code").is_some());
    }
}
