//! Input sanitization to prevent shell injection.
//!
//! Rejects inputs containing dangerous shell metacharacters rather than
//! attempting to escape them. Commands that need pipes or chaining must
//! be built programmatically in tool implementations.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::error::BastionError;

struct ForbiddenPattern {
    regex: Regex,
    reason: &'static str,
}

// These patterns are REJECTED outright — never escaped.
static FORBIDDEN_PATTERNS: Lazy<Vec<ForbiddenPattern>> = Lazy::new(|| {
    vec![
        ForbiddenPattern {
            regex: Regex::new(r"[;&|]").unwrap(),
            reason: "command chaining characters (;, &, |)",
        },
        ForbiddenPattern {
            regex: Regex::new(r"\$[({]").unwrap(),
            reason: "command/variable substitution ($( or ${)",
        },
        ForbiddenPattern {
            regex: Regex::new("`").unwrap(),
            reason: "backtick substitution",
        },
        ForbiddenPattern {
            regex: Regex::new(r"\.\.").unwrap(),
            reason: "path traversal (..)",
        },
        ForbiddenPattern {
            regex: Regex::new(r">\s*/").unwrap(),
            reason: "redirect to absolute path",
        },
        ForbiddenPattern {
            regex: Regex::new(r">>\s*/").unwrap(),
            reason: "append to absolute path",
        },
        ForbiddenPattern {
            regex: Regex::new(r"\b(eval|exec)\b").unwrap(),
            reason: "eval/exec keyword",
        },
        ForbiddenPattern {
            regex: Regex::new("[\n\r\u{0}]").unwrap(),
            reason: "newline/null-byte injection",
        },
    ]
});

fn rejected(field: &str, reason: &str) -> BastionError {
    tracing::warn!(field, reason, "sanitizer_rejected");
    BastionError::Sanitization {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

/// Validate a command string against the forbidden-pattern list.
pub fn check_command(command: &str) -> Result<(), BastionError> {
    for pattern in FORBIDDEN_PATTERNS.iter() {
        if pattern.regex.is_match(command) {
            return Err(rejected("command", pattern.reason));
        }
    }
    Ok(())
}

/// Validate a file path against the forbidden-pattern list.
pub fn check_path(path: &str) -> Result<(), BastionError> {
    if path.contains("..") {
        return Err(rejected("path", "path traversal (..)"));
    }
    if path.contains([';', '&', '|', '`']) {
        return Err(rejected("path", "shell metacharacters in path"));
    }
    if path.contains("$(") || path.contains("${") {
        return Err(rejected("path", "command/variable substitution in path"));
    }
    if path.contains(['\n', '\r', '\0']) {
        return Err(rejected("path", "newline/null-byte in path"));
    }
    Ok(())
}

fn check_plain_field(field: &str, value: &str) -> Result<(), BastionError> {
    if value.contains([';', '&', '|', '`', '$']) {
        return Err(rejected(field, "shell metacharacters"));
    }
    Ok(())
}

/// Sanitize all inputs for a tool call.
///
/// Checks `command` and `path` fields if present, plus any of
/// `container`/`service`/`server`/`since` for bare shell metacharacters.
/// Returns the input unchanged if everything passes — we reject bad
/// input, we never rewrite it.
pub fn sanitize(_tool_name: &str, tool_input: &Value) -> Result<(), BastionError> {
    let obj = match tool_input.as_object() {
        Some(obj) => obj,
        None => return Ok(()),
    };

    if let Some(command) = obj.get("command").and_then(Value::as_str) {
        check_command(command)?;
    }

    if let Some(path) = obj.get("path").and_then(Value::as_str) {
        check_path(path)?;
    }

    for field in ["container", "service", "server", "since"] {
        if let Some(value) = obj.get(field).and_then(Value::as_str) {
            check_plain_field(field, value)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_clean_command() {
        assert!(check_command("uptime").is_ok());
        assert!(check_command("docker ps -a").is_ok());
    }

    #[test]
    fn rejects_chaining() {
        let err = check_command("uptime; rm -rf /").unwrap_err();
        assert!(matches!(err, BastionError::Sanitization { .. }));
        assert!(err.to_string().contains("chaining"));
    }

    #[test]
    fn rejects_substitution() {
        assert!(check_command("echo $(whoami)").is_err());
        assert!(check_command("echo ${HOME}").is_err());
    }

    #[test]
    fn rejects_backtick() {
        assert!(check_command("echo `whoami`").is_err());
    }

    #[test]
    fn rejects_traversal() {
        assert!(check_command("cat ../etc/passwd").is_err());
        assert!(check_path("../etc/passwd").is_err());
    }

    #[test]
    fn rejects_absolute_redirect() {
        assert!(check_command("echo hi > /etc/passwd").is_err());
        assert!(check_command("echo hi >> /etc/passwd").is_err());
    }

    #[test]
    fn allows_relative_redirect() {
        assert!(check_command("echo hi > out.txt").is_ok());
    }

    #[test]
    fn rejects_eval_exec_on_word_boundary() {
        assert!(check_command("eval something").is_err());
        assert!(check_command("exec something").is_err());
        // "retrieval" contains "eval" but not as a standalone word.
        assert!(check_command("retrieval_job").is_ok());
    }

    #[test]
    fn rejects_control_characters() {
        assert!(check_command("uptime\n; rm").is_err());
        assert!(check_command("uptime\0").is_err());
    }

    #[test]
    fn sanitize_returns_input_unchanged_on_success() {
        let input = json!({"command": "uptime", "server": "web1"});
        sanitize("run_local_command", &input).unwrap();
    }

    #[test]
    fn sanitize_rejects_bad_plain_field() {
        let input = json!({"server": "web1; rm -rf /"});
        assert!(sanitize("server_status", &input).is_err());
    }

    #[test]
    fn path_field_rejects_metacharacters() {
        assert!(check_path("/var/log/app.log; rm -rf /").is_err());
        assert!(check_path("/var/log/app.log").is_ok());
    }
}
