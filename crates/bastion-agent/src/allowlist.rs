//! Command allowlist engine.
//!
//! Validates commands against glob-style patterns defined per server role,
//! and paths against prefix allowlists. Allowlisting only — nothing here
//! is ever partially permitted.

use std::path::{Component, Path, PathBuf};

use crate::error::BastionError;
use crate::inventory::RolePermissions;

/// Check if a command matches any allowed pattern for the role.
///
/// The entire (trimmed) command must match one glob pattern; `*` matches
/// any run of characters. This depends on the sanitizer having already
/// rejected shell metacharacters — as defense-in-depth, they are rejected
/// again here.
pub fn is_command_permitted(command: &str, permissions: &RolePermissions) -> bool {
    let trimmed = command.trim();

    if trimmed.contains([';', '|', '&', '`', '\n', '\r', '\0']) {
        return false;
    }

    permissions
        .allowed_commands
        .iter()
        .any(|pattern| glob::Pattern::new(pattern).map(|p| p.matches(trimmed)).unwrap_or(false))
}

/// Collapse `//`, strip `.` segments, strip a trailing `/` (except at
/// root). Deliberately does not resolve symlinks or consult the
/// filesystem — the sanitizer has already rejected `..` before this runs.
fn normalize_path(path: &str) -> String {
    let p = Path::new(path);
    let mut out = PathBuf::new();
    for component in p.components() {
        match component {
            Component::CurDir => {}
            Component::RootDir => out.push("/"),
            other => out.push(other.as_os_str()),
        }
    }
    let mut s = out.to_string_lossy().to_string();
    if s.len() > 1 && s.ends_with('/') {
        s.pop();
    }
    if s.is_empty() {
        s.push('/');
    }
    s
}

fn path_allowed(path: &str, allowed: &[String]) -> bool {
    let normalized = normalize_path(path);
    allowed.iter().any(|prefix| {
        let trimmed_prefix = prefix.trim_end_matches('/');
        normalized == trimmed_prefix || normalized.starts_with(&format!("{trimmed_prefix}/"))
    })
}

/// Check if a file path falls under any allowed read prefix for the role.
pub fn is_path_readable(path: &str, permissions: &RolePermissions) -> bool {
    path_allowed(path, &permissions.allowed_paths_read)
}

/// Check if a file path falls under any allowed write prefix for the role.
///
/// Reserved: no built-in tool calls this yet, but the predicate is fully
/// functional for future write-capable tools.
pub fn is_path_writable(path: &str, permissions: &RolePermissions) -> bool {
    path_allowed(path, &permissions.allowed_paths_write)
}

/// Validate a command against the allowlist, raising on denial.
pub fn check_command(
    command: &str,
    role: &str,
    permissions: &RolePermissions,
) -> Result<(), BastionError> {
    if !is_command_permitted(command, permissions) {
        tracing::warn!(command, role, "allowlist_denied");
        return Err(BastionError::AllowlistDenied {
            detail: command.to_string(),
            role: role.to_string(),
        });
    }
    Ok(())
}

/// Validate a read path against the allowlist, raising on denial.
pub fn check_path_read(
    path: &str,
    role: &str,
    permissions: &RolePermissions,
) -> Result<(), BastionError> {
    if !is_path_readable(path, permissions) {
        tracing::warn!(path, role, "path_read_denied");
        return Err(BastionError::AllowlistDenied {
            detail: format!("read:{path}"),
            role: role.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn role(commands: &[&str], read: &[&str], write: &[&str]) -> RolePermissions {
        RolePermissions {
            allowed_commands: commands.iter().map(|s| s.to_string()).collect(),
            allowed_paths_read: read.iter().map(|s| s.to_string()).collect(),
            allowed_paths_write: write.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn glob_matches_whole_command() {
        let r = role(&["docker ps*", "uptime"], &[], &[]);
        assert!(is_command_permitted("docker ps -a", &r));
        assert!(is_command_permitted("uptime", &r));
        assert!(!is_command_permitted("uptime; rm -rf /", &r));
        assert!(!is_command_permitted("rm -rf /", &r));
    }

    #[test]
    fn empty_allowlist_denies_everything() {
        let r = role(&[], &[], &[]);
        assert!(!is_command_permitted("uptime", &r));
    }

    #[test]
    fn wildcard_still_subject_to_metachar_reject() {
        let r = role(&["*"], &[], &[]);
        assert!(is_command_permitted("uptime", &r));
        assert!(!is_command_permitted("uptime; rm -rf /", &r));
    }

    #[test]
    fn path_normalization_variants_match() {
        let r = role(&[], &["/var/log"], &[]);
        assert!(is_path_readable("/var/log/app.log", &r));
        assert!(is_path_readable("/var/log//app.log", &r));
        assert!(is_path_readable("/var/log/./app.log", &r));
        assert!(is_path_readable("/var/log", &r));
        assert!(!is_path_readable("/var/logger/app.log", &r));
        assert!(!is_path_readable("/etc/passwd", &r));
    }

    #[test]
    fn write_predicate_is_independent_of_read() {
        let r = role(&[], &["/var/log"], &["/var/www"]);
        assert!(is_path_writable("/var/www/index.html", &r));
        assert!(!is_path_writable("/var/log/app.log", &r));
    }

    #[test]
    fn check_command_raises_allowlist_denied() {
        let r = role(&["uptime"], &[], &[]);
        let err = check_command("rm -rf /", "web", &r).unwrap_err();
        assert!(matches!(err, BastionError::AllowlistDenied { .. }));
    }
}
