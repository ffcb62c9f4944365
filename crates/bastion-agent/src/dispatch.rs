//! Dispatch kernel: the six-stage pipeline that turns one tool-use request
//! into one tool-result, and the registry it is built on.
//!
//! `sanitize -> audit-attempt -> allowlist -> approval -> execute-with-timeout
//! -> audit-result`. Every stage can short-circuit with a `{"error": ...}`
//! mapping; every short-circuit writes exactly one audit record.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use crate::audit::AuditLog;
use crate::config::{ApprovalMode, ExecutionConfig};
use crate::inventory::Inventory;
use crate::tools::context::ToolContext;
use crate::tools::registry::ToolRegistry;
use crate::{allowlist, approval, error::BastionError, sanitizer};

pub struct DispatchKernel {
    registry: ToolRegistry,
    inventory: Arc<Inventory>,
    audit: Arc<AuditLog>,
    config: ExecutionConfig,
    approval_mode: ApprovalMode,
}

impl DispatchKernel {
    pub fn new(
        inventory: Arc<Inventory>,
        audit: Arc<AuditLog>,
        config: ExecutionConfig,
        approval_mode: ApprovalMode,
    ) -> Self {
        Self {
            registry: ToolRegistry::new(),
            inventory,
            audit,
            config,
            approval_mode,
        }
    }

    pub fn register(&mut self, tool: Arc<dyn crate::tools::context::Tool>) -> Result<(), BastionError> {
        self.registry.register(tool)
    }

    pub fn get_schemas(&self) -> Vec<bastion_core::Tool> {
        self.registry.get_schemas()
    }

    /// The shared audit log, for session-bracket events (`session_start`/
    /// `session_end`) that live outside the per-dispatch pipeline.
    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    /// Resolve the effective role for a tool call: the role of `input.server`
    /// when present, otherwise the role of the `localhost` inventory entry.
    /// An absent `localhost` entry is itself a denial — there is nothing to
    /// authorize a bastion-host command against.
    fn resolve_role<'a>(
        &'a self,
        input: &Value,
    ) -> Result<(&'a str, &'a crate::inventory::RolePermissions), BastionError> {
        let server_name = input
            .get("server")
            .and_then(Value::as_str)
            .unwrap_or("localhost");
        let permissions = self.inventory.permissions_for_server(server_name)?;
        let entry = self.inventory.server(server_name).expect("looked up above");
        Ok((&entry.role, permissions))
    }

    #[tracing::instrument(name = "dispatch.pipeline", skip(self, raw_input), fields(tool = tool_name))]
    pub async fn dispatch(&self, tool_name: &str, raw_input: Value) -> Value {
        // 1. Lookup
        let Some(tool) = self.registry.find(tool_name) else {
            return json!({"error": format!("Unknown tool: {tool_name}")});
        };

        // 2. Sanitize
        if let Err(err) = sanitizer::sanitize(tool_name, &raw_input) {
            let reason = match &err {
                BastionError::Sanitization { reason, .. } => reason.clone(),
                other => other.to_string(),
            };
            let _ = self
                .audit
                .tool_denied(tool_name, &raw_input, &format!("sanitizer: {reason}"))
                .await;
            return json!({"error": format!("Input rejected: {reason}")});
        }

        // 3. Record attempt
        let _ = self.audit.tool_attempt(tool_name, &raw_input).await;

        // 4. Authorize
        let has_command = raw_input.get("command").and_then(Value::as_str).is_some();
        let has_path = raw_input.get("path").and_then(Value::as_str).is_some();
        if has_command || has_path {
            let (role, permissions) = match self.resolve_role(&raw_input) {
                Ok(pair) => pair,
                Err(e) => {
                    let detail = e.to_string();
                    let _ = self.audit.tool_denied(tool_name, &raw_input, &detail).await;
                    return json!({"error": format!("Operation not permitted by security policy: {detail}")});
                }
            };

            if let Some(command) = raw_input.get("command").and_then(Value::as_str) {
                if let Err(BastionError::AllowlistDenied { detail, .. }) =
                    allowlist::check_command(command, role, permissions)
                {
                    let _ = self.audit.tool_denied(tool_name, &raw_input, &detail).await;
                    return json!({"error": format!("Operation not permitted by security policy: {detail}")});
                }
            }
            if let Some(path) = raw_input.get("path").and_then(Value::as_str) {
                if let Err(BastionError::AllowlistDenied { detail, .. }) =
                    allowlist::check_path_read(path, role, permissions)
                {
                    let _ = self.audit.tool_denied(tool_name, &raw_input, &detail).await;
                    return json!({"error": format!("Operation not permitted by security policy: {detail}")});
                }
            }
        }

        // 5. Approval
        if approval::requires_approval(tool_name, &raw_input, self.inventory.approval_required_patterns())
        {
            let approved = approval::request_approval(tool_name, &raw_input, self.approval_mode).await;
            if !approved {
                let _ = self.audit.tool_denied(tool_name, &raw_input, "human_denied").await;
                return json!({"error": "Operation denied by operator"});
            }
        }

        // 6. Execute with timeout
        let ctx = ToolContext {
            inventory: &self.inventory,
            command_timeout_secs: self.config.command_timeout_secs,
            ssh_connect_timeout_secs: self.config.ssh_connect_timeout_secs,
        };
        let deadline = Duration::from_secs(self.config.command_timeout_secs);

        match tokio::time::timeout(deadline, tool.execute(&raw_input, &ctx)).await {
            Err(_) => {
                let _ = self
                    .audit
                    .tool_timeout(tool_name, &raw_input, self.config.command_timeout_secs)
                    .await;
                json!({"error": format!("Operation timed out ({}s)", self.config.command_timeout_secs)})
            }
            Ok(Err(e)) => {
                let detail = e.to_string();
                let _ = self.audit.tool_error(tool_name, &raw_input, &detail).await;
                json!({"error": format!("Execution failed: {detail}")})
            }
            Ok(Ok(result)) => {
                let value = result.to_value();
                if result.success() {
                    let _ = self.audit.tool_success(tool_name, &raw_input, &value).await;
                } else {
                    let _ = self.audit.tool_error(tool_name, &raw_input, &result.error).await;
                }
                value
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::context::{Tool, ToolError, ToolResult};
    use async_trait::async_trait;
    use std::time::Duration as StdDuration;

    struct SleepyTool;

    #[async_trait]
    impl Tool for SleepyTool {
        fn name(&self) -> &str {
            "sleepy"
        }

        fn definition(&self) -> bastion_core::Tool {
            bastion_core::Tool::function("sleepy", "sleeps", json!({"type": "object"}))
        }

        async fn execute(&self, _args: &Value, _ctx: &ToolContext<'_>) -> Result<ToolResult, ToolError> {
            tokio::time::sleep(StdDuration::from_secs(5)).await;
            Ok(ToolResult::ok("done"))
        }
    }

    async fn kernel_with(
        inventory: Inventory,
        approval_mode: ApprovalMode,
        command_timeout_secs: u64,
    ) -> (DispatchKernel, tempfile::TempDir) {
        let dir = tempfile::TempDir::new().unwrap();
        let audit = Arc::new(AuditLog::open(&dir.path().join("audit.jsonl"), 2000).await.unwrap());
        let config = ExecutionConfig {
            command_timeout_secs,
            ..ExecutionConfig::default()
        };
        (
            DispatchKernel::new(Arc::new(inventory), audit, config, approval_mode),
            dir,
        )
    }

    fn inventory_with_localhost(commands: &[&str]) -> Inventory {
        let toml = format!(
            r#"
            [servers.localhost]
            host = "127.0.0.1"
            role = "local"
            ssh = false

            [roles.local]
            allowed_commands = [{}]
            "#,
            commands.iter().map(|c| format!("\"{c}\"")).collect::<Vec<_>>().join(", ")
        );
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("inv.toml");
        std::fs::write(&path, toml).unwrap();
        Inventory::load(&path).unwrap()
    }

    #[tokio::test]
    async fn inject_then_allowlist_is_rejected_by_sanitizer() {
        let inventory = inventory_with_localhost(&["uptime"]);
        let (kernel, _dir) = kernel_with(inventory, ApprovalMode::Interactive, 5).await;
        let mut registry = ToolRegistry::new();
        registry
            .register(Arc::new(crate::tools::builtins::LocalCommandTool))
            .unwrap();
        let kernel = DispatchKernel { registry, ..kernel };

        let result = kernel
            .dispatch("run_local_command", json!({"command": "uptime; rm -rf /"}))
            .await;
        assert_eq!(
            result["error"],
            "Input rejected: command chaining characters (;, &, |)"
        );
    }

    #[tokio::test]
    async fn approval_auto_deny_blocks_matching_command() {
        let mut registry = ToolRegistry::new();
        registry
            .register(Arc::new(crate::tools::builtins::LocalCommandTool))
            .unwrap();

        let toml = r#"
            approval_required_patterns = ["restart"]

            [servers.localhost]
            host = "127.0.0.1"
            role = "local"
            ssh = false

            [roles.local]
            allowed_commands = ["docker restart *"]
        "#;
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("inv.toml");
        std::fs::write(&path, toml).unwrap();
        let inventory = Inventory::load(&path).unwrap();

        let (kernel, _audit_dir) = kernel_with(inventory, ApprovalMode::AutoDeny, 5).await;
        let kernel = DispatchKernel { registry, ..kernel };

        let result = kernel
            .dispatch("run_local_command", json!({"command": "docker restart app"}))
            .await;
        assert_eq!(result["error"], "Operation denied by operator");
    }

    #[tokio::test]
    async fn timeout_surfaces_as_timeout_error() {
        let inventory = Inventory::default();
        let (kernel, _dir) = kernel_with(inventory, ApprovalMode::Interactive, 1).await;
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(SleepyTool)).unwrap();
        let kernel = DispatchKernel { registry, ..kernel };

        let result = kernel.dispatch("sleepy", json!({})).await;
        assert_eq!(result["error"], "Operation timed out (1s)");
    }

    #[tokio::test]
    async fn unknown_tool_is_rejected_at_lookup() {
        let inventory = Inventory::default();
        let (kernel, _dir) = kernel_with(inventory, ApprovalMode::Interactive, 5).await;
        let result = kernel.dispatch("does_not_exist", json!({})).await;
        assert_eq!(result["error"], "Unknown tool: does_not_exist");
    }
}
