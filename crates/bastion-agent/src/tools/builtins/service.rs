//! Inspect systemd services on the bastion host or a named server.

use async_trait::async_trait;
use bastion_core::Tool as ToolSchema;
use serde_json::{json, Value};

use crate::tools::builtins::target::run_on_target;
use crate::tools::context::{Tool, ToolContext, ToolError, ToolResult};

pub struct ServiceStatusTool;

#[async_trait]
impl Tool for ServiceStatusTool {
    fn name(&self) -> &str {
        "service_status"
    }

    fn definition(&self) -> ToolSchema {
        ToolSchema::function(
            self.name(),
            "Check the status of a systemd service on the bastion host or a named server.",
            json!({
                "type": "object",
                "properties": {
                    "server": {
                        "type": "string",
                        "description": "Name of the server in the inventory; omit for the bastion host itself."
                    },
                    "service": {
                        "type": "string",
                        "description": "Name of the systemd unit, e.g. 'nginx'."
                    }
                },
                "required": ["service"]
            }),
        )
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext<'_>) -> Result<ToolResult, ToolError> {
        let server = args.get("server").and_then(Value::as_str);
        let service = args
            .get("service")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidRequest("service is required".to_string()))?;

        let command = format!("systemctl status {service} --no-pager");
        Ok(run_on_target(ctx, server, &command).await)
    }
}

pub struct ServiceJournalTool;

#[async_trait]
impl Tool for ServiceJournalTool {
    fn name(&self) -> &str {
        "service_journal"
    }

    fn definition(&self) -> ToolSchema {
        ToolSchema::function(
            self.name(),
            "Fetch recent journal entries for a systemd service on the bastion host or a named server.",
            json!({
                "type": "object",
                "properties": {
                    "server": {
                        "type": "string",
                        "description": "Name of the server in the inventory; omit for the bastion host itself."
                    },
                    "service": {
                        "type": "string",
                        "description": "Name of the systemd unit, e.g. 'nginx'."
                    },
                    "since": {
                        "type": "string",
                        "description": "Only return entries newer than this, e.g. '1 hour ago'."
                    }
                },
                "required": ["service"]
            }),
        )
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext<'_>) -> Result<ToolResult, ToolError> {
        let server = args.get("server").and_then(Value::as_str);
        let service = args
            .get("service")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidRequest("service is required".to_string()))?;
        let since = args.get("since").and_then(Value::as_str);

        let command = match since {
            Some(since) => format!("journalctl -u {service} --since '{since}' --no-pager"),
            None => format!("journalctl -u {service} -n 200 --no-pager"),
        };

        Ok(run_on_target(ctx, server, &command).await)
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
    async fn service_status_requires_service() {
        let inventory = Inventory::default();
        let tool = ServiceStatusTool;
        let err = tool.execute(&json!({}), &ctx(&inventory)).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn service_journal_unknown_server_fails_cleanly() {
        let inventory = Inventory::default();
        let tool = ServiceJournalTool;
        let result = tool
            .execute(&json!({"server": "ghost", "service": "nginx"}), &ctx(&inventory))
            .await
            .unwrap();
        assert!(!result.success());
        assert!(result.error.contains("Unknown server"));
    }
}
