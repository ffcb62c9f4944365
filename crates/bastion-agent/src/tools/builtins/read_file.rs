//! Read a file from an allowed path prefix.
//!
//! Path authorization happens one layer up, in the dispatch kernel; this
//! tool only performs the read once the kernel has already cleared it.

use async_trait::async_trait;
use bastion_core::Tool as ToolSchema;
use serde_json::{json, Value};

use crate::tools::context::{Tool, ToolContext, ToolError, ToolResult};

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn definition(&self) -> ToolSchema {
        ToolSchema::function(
            self.name(),
            "Read the contents of a file on the bastion host.",
            json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Absolute path to the file to read."
                    }
                },
                "required": ["path"]
            }),
        )
    }

    async fn execute(&self, args: &Value, _ctx: &ToolContext<'_>) -> Result<ToolResult, ToolError> {
        let path = args
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidRequest("path is required".to_string()))?;

        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(ToolResult::ok(String::from_utf8_lossy(&bytes).to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(ToolResult::failed(format!("File not found: {path}"), 1))
            }
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                Ok(ToolResult::failed(format!("Permission denied: {path}"), 1))
            }
            Err(e) => Ok(ToolResult::failed(format!("Failed to read file: {e}"), 1)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::Inventory;

    #[tokio::test]
    async fn reads_an_existing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("hello.txt");
        tokio::fs::write(&path, "hello world").await.unwrap();

        let inventory = Inventory::default();
        let ctx = ToolContext {
            inventory: &inventory,
            command_timeout_secs: 5,
            ssh_connect_timeout_secs: 5,
        };
        let tool = ReadFileTool;
        let result = tool
            .execute(&json!({"path": path.to_string_lossy()}), &ctx)
            .await
            .unwrap();
        assert_eq!(result.output, "hello world");
        assert!(result.success());
    }

    #[tokio::test]
    async fn missing_file_is_a_tool_result_error_not_a_raise() {
        let inventory = Inventory::default();
        let ctx = ToolContext {
            inventory: &inventory,
            command_timeout_secs: 5,
            ssh_connect_timeout_secs: 5,
        };
        let tool = ReadFileTool;
        let result = tool
            .execute(&json!({"path": "/no/such/file"}), &ctx)
            .await
            .unwrap();
        assert!(!result.success());
    }
}
