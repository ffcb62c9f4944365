//! Run a command on the bastion host itself (the `localhost` inventory
//! entry), tokenized and executed exec-style — no shell is ever
//! interposed, so chaining/substitution syntax is inert even if it
//! somehow reached this far.

use std::time::Duration;

use async_trait::async_trait;
use bastion_core::Tool as ToolSchema;
use serde_json::{json, Value};

use crate::tools::context::{Tool, ToolContext, ToolError, ToolResult};
use crate::tools::exec::run_local;

pub struct LocalCommandTool;

#[async_trait]
impl Tool for LocalCommandTool {
    fn name(&self) -> &str {
        "run_local_command"
    }

    fn definition(&self) -> ToolSchema {
        ToolSchema::function(
            self.name(),
            "Run a command on the bastion host itself and return its output.",
            json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "The command to run, e.g. 'uptime' or 'docker ps -a'."
                    }
                },
                "required": ["command"]
            }),
        )
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext<'_>) -> Result<ToolResult, ToolError> {
        let command = args
            .get("command")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidRequest("command is required".to_string()))?;

        Ok(run_local(
            command,
            Duration::from_secs(ctx.command_timeout_secs),
            None,
        )
        .await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::Inventory;

    fn ctx(inventory: &Inventory) -> ToolContext<'_> {
        ToolContext {
            inventory,
            command_timeout_secs: 5,
            ssh_connect_timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn runs_a_command_and_captures_output() {
        let inventory = Inventory::default();
        let tool = LocalCommandTool;
        let result = tool
            .execute(&json!({"command": "echo hello"}), &ctx(&inventory))
            .await
            .unwrap();
        assert_eq!(result.exit_code, 0);
        assert!(result.output.contains("hello"));
    }

    #[tokio::test]
    async fn missing_command_is_invalid_request() {
        let inventory = Inventory::default();
        let tool = LocalCommandTool;
        let err = tool.execute(&json!({}), &ctx(&inventory)).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidRequest(_)));
    }
}
