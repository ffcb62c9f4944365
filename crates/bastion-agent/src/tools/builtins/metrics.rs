//! Query a server's metrics endpoint over HTTP.
//!
//! Always safe — read-only, no side effects — so the approval gate
//! short-circuits it regardless of input (see `approval::ALWAYS_SAFE_TOOLS`).

use std::time::Duration;

use async_trait::async_trait;
use bastion_core::Tool as ToolSchema;
use serde_json::{json, Value};

use crate::tools::context::{Tool, ToolContext, ToolError, ToolResult};

pub struct QueryMetricsTool;

#[async_trait]
impl Tool for QueryMetricsTool {
    fn name(&self) -> &str {
        "query_metrics"
    }

    fn definition(&self) -> ToolSchema {
        ToolSchema::function(
            self.name(),
            "Fetch the current metrics snapshot for a server's configured metrics endpoint.",
            json!({
                "type": "object",
                "properties": {
                    "server": {
                        "type": "string",
                        "description": "Name of the server in the inventory."
                    }
                },
                "required": ["server"]
            }),
        )
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext<'_>) -> Result<ToolResult, ToolError> {
        let server_name = args
            .get("server")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidRequest("server is required".to_string()))?;

        let entry = ctx
            .inventory
            .server(server_name)
            .ok_or_else(|| ToolError::InvalidRequest(format!("Unknown server: {server_name}")))?;

        let Some(url) = &entry.metrics_url else {
            return Ok(ToolResult::failed(
                format!("Server '{server_name}' has no metrics_url configured"),
                1,
            ));
        };

        let client = match reqwest::Client::builder()
            .timeout(Duration::from_secs(ctx.command_timeout_secs))
            .build()
        {
            Ok(client) => client,
            Err(e) => return Ok(ToolResult::failed(format!("Failed to build HTTP client: {e}"), 1)),
        };

        match client.get(url).send().await {
            Ok(response) if response.status().is_success() => match response.text().await {
                Ok(body) => Ok(ToolResult::ok(body)),
                Err(e) => Ok(ToolResult::failed(format!("Failed to read metrics response: {e}"), 1)),
            },
            Ok(response) => Ok(ToolResult::failed(
                format!("Metrics endpoint returned status {}", response.status()),
                1,
            )),
            Err(e) if e.is_timeout() => Ok(ToolResult::failed(
                format!("Metrics request to '{server_name}' timed out"),
                124,
            )),
            Err(e) => Ok(ToolResult::failed(format!("Metrics request failed: {e}"), 1)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::Inventory;

    #[tokio::test]
    async fn unknown_server_is_invalid_request() {
        let inventory = Inventory::default();
        let ctx = ToolContext {
            inventory: &inventory,
            command_timeout_secs: 5,
            ssh_connect_timeout_secs: 5,
        };
        let tool = QueryMetricsTool;
        let err = tool
            .execute(&json!({"server": "ghost"}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidRequest(_)));
    }
}
