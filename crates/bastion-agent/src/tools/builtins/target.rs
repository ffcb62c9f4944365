//! Shared helper for tools that run a fixed, internally-assembled command
//! either on the bastion host or on a named inventory server over SSH.
//!
//! Unlike `run_local_command`/`run_remote_command`, these tools never hand
//! a user-supplied full command string to the shell tokenizer — they build
//! one from a verb plus already-sanitized arguments, so there is no
//! allowlist check on the way in (the dispatch kernel's authorize stage
//! only runs against a literal `command` field).

use std::time::Duration;

use crate::tools::context::{ToolContext, ToolResult};
use crate::tools::exec::{run_local, run_remote};

pub async fn run_on_target(ctx: &ToolContext<'_>, server: Option<&str>, command: &str) -> ToolResult {
    let command_timeout = Duration::from_secs(ctx.command_timeout_secs);

    let Some(server_name) = server else {
        return run_local(command, command_timeout, None).await;
    };

    let Some(entry) = ctx.inventory.server(server_name) else {
        return ToolResult::failed(format!("Unknown server: {server_name}"), 1);
    };

    if !entry.ssh {
        return run_local(command, command_timeout, None).await;
    }

    run_remote(
        server_name,
        entry,
        command,
        Duration::from_secs(ctx.ssh_connect_timeout_secs),
        command_timeout,
    )
    .await
}
