//! List the servers known to the inventory. Always safe — no side
//! effects, never requires approval.

use async_trait::async_trait;
use bastion_core::Tool as ToolSchema;
use serde_json::{json, Value};

use crate::tools::context::{Tool, ToolContext, ToolError, ToolResult};

pub struct ListServersTool;

#[async_trait]
impl Tool for ListServersTool {
    fn name(&self) -> &str {
        "list_servers"
    }

    fn definition(&self) -> ToolSchema {
        ToolSchema::function(
            self.name(),
            "List all servers known to the agent's inventory.",
            json!({"type": "object", "properties": {}, "required": []}),
        )
    }

    async fn execute(&self, _args: &Value, ctx: &ToolContext<'_>) -> Result<ToolResult, ToolError> {
        let names = ctx.inventory.server_names();
        let mut lines = Vec::with_capacity(names.len());
        for name in &names {
            if let Some(entry) = ctx.inventory.server(name) {
                lines.push(format!("{name}: {} (role: {})", entry.host, entry.role));
            }
        }
        Ok(ToolResult::ok(lines.join("\n")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::Inventory;

    #[tokio::test]
    async fn lists_servers_sorted_by_name() {
        let inventory = Inventory::default();
        let ctx = ToolContext {
            inventory: &inventory,
            command_timeout_secs: 5,
            ssh_connect_timeout_secs: 5,
        };
        let tool = ListServersTool;
        let result = tool.execute(&json!({}), &ctx).await.unwrap();
        assert!(result.success());
        assert_eq!(result.output, "");
    }
}
