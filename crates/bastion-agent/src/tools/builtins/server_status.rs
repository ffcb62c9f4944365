//! Quick health probe for a server: uptime, load, and disk usage in one call.

use async_trait::async_trait;
use bastion_core::Tool as ToolSchema;
use serde_json::{json, Value};

use crate::tools::builtins::target::run_on_target;
use crate::tools::context::{Tool, ToolContext, ToolError, ToolResult};

pub struct ServerStatusTool;

#[async_trait]
impl Tool for ServerStatusTool {
    fn name(&self) -> &str {
        "server_status"
    }

    fn definition(&self) -> ToolSchema {
        ToolSchema::function(
            self.name(),
            "Report uptime, load average, memory, and disk usage for a server.",
            json!({
                "type": "object",
                "properties": {
                    "server": {
                        "type": "string",
                        "description": "Name of the server in the inventory; omit for the bastion host itself."
                    }
                },
                "required": []
            }),
        )
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext<'_>) -> Result<ToolResult, ToolError> {
        let server = args.get("server").and_then(Value::as_str);

        // Run each probe as its own exec-style invocation — there is no
        // shell here to interpret `&&`, so the three commands can't be
        // chained into one call the way an interactive shell would.
        let mut sections = Vec::new();
        let mut worst_exit_code = 0;
        let mut errors = Vec::new();
        for (label, command) in [("uptime", "uptime"), ("memory", "free -h"), ("disk", "df -h")] {
            let result = run_on_target(ctx, server, command).await;
            if !result.success() {
                worst_exit_code = result.exit_code;
                errors.push(format!("{label}: {}", result.error));
            }
            sections.push(format!("=== {label} ===\n{}", result.output));
        }

        Ok(ToolResult {
            output: sections.join("\n"),
            error: errors.join("; "),
            exit_code: worst_exit_code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::Inventory;

    #[tokio::test]
    async fn unknown_server_fails_cleanly() {
        let inventory = Inventory::default();
        let ctx = ToolContext {
            inventory: &inventory,
            command_timeout_secs: 5,
            ssh_connect_timeout_secs: 5,
        };
        let tool = ServerStatusTool;
        let result = tool
            .execute(&json!({"server": "ghost"}), &ctx)
            .await
            .unwrap();
        assert!(!result.success());
        assert!(result.error.contains("Unknown server"));
    }
}
