//! Run a command on a remote inventory server over SSH.

use std::time::Duration;

use async_trait::async_trait;
use bastion_core::Tool as ToolSchema;
use serde_json::{json, Value};

use crate::tools::context::{Tool, ToolContext, ToolError, ToolResult};
use crate::tools::exec::run_remote;

pub struct RemoteCommandTool;

#[async_trait]
impl Tool for RemoteCommandTool {
    fn name(&self) -> &str {
        "run_remote_command"
    }

    fn definition(&self) -> ToolSchema {
        ToolSchema::function(
            self.name(),
            "Run a command on a remote server over SSH and return its output.",
            json!({
                "type": "object",
                "properties": {
                    "server": {
                        "type": "string",
                        "description": "Name of the server in the inventory."
                    },
                    "command": {
                        "type": "string",
                        "description": "The command to run on the remote host."
                    }
                },
                "required": ["server", "command"]
            }),
        )
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext<'_>) -> Result<ToolResult, ToolError> {
        let server_name = args
            .get("server")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidRequest("server is required".to_string()))?;
        let command = args
            .get("command")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidRequest("command is required".to_string()))?;

        let server = ctx
            .inventory
            .server(server_name)
            .ok_or_else(|| ToolError::InvalidRequest(format!("Unknown server: {server_name}")))?;

        if !server.ssh {
            return Err(ToolError::InvalidRequest(format!(
                "Server '{server_name}' is not configured for SSH access"
            )));
        }

        Ok(run_remote(
            server_name,
            server,
            command,
            Duration::from_secs(ctx.ssh_connect_timeout_secs),
            Duration::from_secs(ctx.command_timeout_secs),
        )
        .await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::Inventory;

    #[tokio::test]
    async fn unknown_server_is_invalid_request() {
        let inventory = Inventory::default();
        let tool = RemoteCommandTool;
        let ctx = ToolContext {
            inventory: &inventory,
            command_timeout_secs: 5,
            ssh_connect_timeout_secs: 5,
        };
        let err = tool
            .execute(&json!({"server": "ghost", "command": "uptime"}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidRequest(_)));
    }
}
