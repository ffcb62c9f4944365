//! Human-in-the-loop approval gate for destructive operations.
//!
//! Checks whether a tool call requires human confirmation against the
//! inventory's approval-required pattern list. In interactive mode,
//! prompts the operator via the controlling terminal. In auto-deny mode,
//! every matching operation is refused without prompting.

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::config::ApprovalMode;

/// Tools that are always safe (read-only, no side effects) and never
/// require approval regardless of their input.
const ALWAYS_SAFE_TOOLS: &[&str] = &["list_servers", "query_metrics"];

/// Determine if a tool call requires human approval.
pub fn requires_approval(tool_name: &str, tool_input: &Value, approval_patterns: &[String]) -> bool {
    if ALWAYS_SAFE_TOOLS.contains(&tool_name) {
        return false;
    }

    let mut values = Vec::new();
    extract_string_values(tool_input, &mut values);

    for value in &values {
        let value_lower = value.to_lowercase();
        for pattern in approval_patterns {
            if value_lower.contains(&pattern.to_lowercase()) {
                tracing::info!(
                    tool = tool_name,
                    matched_pattern = pattern.as_str(),
                    matched_value = value.as_str(),
                    "approval_required"
                );
                return true;
            }
        }
    }

    false
}

fn extract_string_values(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.push(s.clone()),
        Value::Object(map) => {
            for v in map.values() {
                extract_string_values(v, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                extract_string_values(item, out);
            }
        }
        _ => {}
    }
}

/// Request human approval for a destructive operation.
///
/// Only called when [`requires_approval`] returned true. In `AutoDeny`
/// mode this never prompts. In `Interactive` mode, the terminal read
/// runs off the main task via a blocking-read wrapper so it never stalls
/// the event loop.
pub async fn request_approval(tool_name: &str, tool_input: &Value, mode: ApprovalMode) -> bool {
    if mode == ApprovalMode::AutoDeny {
        tracing::info!(tool = tool_name, "approval_auto_denied");
        return false;
    }

    println!("\n=== Approval Required ===");
    println!("Tool: {tool_name}");
    println!("Parameters:");
    if let Some(obj) = tool_input.as_object() {
        for (k, v) in obj {
            println!("  {k}: {v}");
        }
    }
    print!("Approve this operation? [y/N]: ");
    use std::io::Write;
    let _ = std::io::stdout().flush();

    let response = tokio::task::spawn_blocking(read_stdin_line)
        .await
        .unwrap_or(None);

    let approved = matches!(response.as_deref(), Some("y") | Some("yes"));
    if approved {
        tracing::info!(tool = tool_name, "approval_granted");
        println!("Approved.");
    } else {
        tracing::info!(tool = tool_name, "approval_denied");
        println!("Denied.");
    }
    approved
}

fn read_stdin_line() -> Option<String> {
    use std::io::BufRead;
    let stdin = std::io::stdin();
    let mut line = String::new();
    match stdin.lock().read_line(&mut line) {
        Ok(0) => None,
        Ok(_) => Some(line.trim().to_lowercase()),
        Err(_) => None,
    }
}

/// Read one line off an arbitrary async reader (used by the daemon
/// transport, which prompts over the client socket rather than stdin).
pub async fn read_async_line<R>(reader: &mut BufReader<R>) -> Option<String>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut line = String::new();
    match reader.read_line(&mut line).await {
        Ok(0) => None,
        Ok(_) => Some(line.trim().to_lowercase()),
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn always_safe_tools_never_require_approval() {
        let patterns = vec!["rm -rf".to_string()];
        assert!(!requires_approval(
            "list_servers",
            &json!({"role": "rm -rf everything"}),
            &patterns
        ));
    }

    #[test]
    fn matches_nested_values() {
        let patterns = vec!["restart".to_string()];
        let input = json!({"command": "docker restart app", "tags": ["prod"]});
        assert!(requires_approval("docker_restart", &input, &patterns));
    }

    #[test]
    fn matches_inside_arrays() {
        let patterns = vec!["delete".to_string()];
        let input = json!({"args": ["--force", "delete-everything"]});
        assert!(requires_approval("run_local_command", &input, &patterns));
    }

    #[test]
    fn empty_pattern_list_never_requires_approval() {
        let input = json!({"command": "rm -rf /"});
        assert!(!requires_approval("run_local_command", &input, &[]));
    }

    #[test]
    fn non_string_leaves_are_ignored() {
        let patterns = vec!["5".to_string()];
        let input = json!({"count": 5});
        assert!(!requires_approval("query_something", &input, &patterns));
    }

    #[tokio::test]
    async fn auto_deny_never_prompts() {
        let input = json!({"command": "docker restart app"});
        assert!(!request_approval("docker_restart", &input, ApprovalMode::AutoDeny).await);
    }
}
