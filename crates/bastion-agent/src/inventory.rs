//! The frozen server/role/approval-pattern inventory.
//!
//! Built once at startup from a TOML file and treated as read-only by the
//! rest of the agent, exactly like [`crate::config::BastionConfig`].

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::BastionError;

/// Permissions attached to a server role.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RolePermissions {
    pub allowed_commands: Vec<String>,
    pub allowed_paths_read: Vec<String>,
    /// Reserved for future write-capable tools; no built-in tool calls
    /// [`crate::allowlist::is_path_writable`] yet, but the predicate is
    /// fully functional so one can be added without touching this type.
    pub allowed_paths_write: Vec<String>,
}

/// One server entry in the inventory.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerEntry {
    pub host: String,
    pub role: String,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default = "default_true")]
    pub ssh: bool,
    #[serde(default)]
    pub key_path: Option<String>,
    #[serde(default)]
    pub known_hosts_path: Option<String>,
    /// Opt-out of host-key verification when `known_hosts_path` is absent.
    /// Defaults to `false`: the remote-command tool refuses to connect to
    /// an unverifiable host unless this is set explicitly.
    #[serde(default)]
    pub insecure_accept_unknown_hosts: bool,
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub metrics_url: Option<String>,
}

fn default_user() -> String {
    "bastion-agent".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
struct InventoryFile {
    #[serde(default)]
    servers: HashMap<String, ServerEntry>,
    #[serde(default)]
    roles: HashMap<String, RolePermissions>,
    #[serde(default)]
    approval_required_patterns: Vec<String>,
}

/// Mapping of servers and roles, plus the global approval pattern list.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    servers: HashMap<String, ServerEntry>,
    roles: HashMap<String, RolePermissions>,
    approval_required_patterns: Vec<String>,
}

impl Inventory {
    pub fn load(path: &Path) -> Result<Self, BastionError> {
        let text = std::fs::read_to_string(path)?;
        let file: InventoryFile = toml::from_str(&text)
            .map_err(|e| BastionError::ConfigParse(format!("{}: {e}", path.display())))?;
        Ok(Self {
            servers: file.servers,
            roles: file.roles,
            approval_required_patterns: file.approval_required_patterns,
        })
    }

    pub fn server(&self, name: &str) -> Option<&ServerEntry> {
        self.servers.get(name)
    }

    pub fn role(&self, name: &str) -> Option<&RolePermissions> {
        self.roles.get(name)
    }

    /// Look up the effective [`RolePermissions`] for a named server.
    pub fn permissions_for_server(&self, server: &str) -> Result<&RolePermissions, BastionError> {
        let entry = self
            .server(server)
            .ok_or_else(|| BastionError::UnknownServer {
                name: server.to_string(),
            })?;
        self.role(&entry.role)
            .ok_or_else(|| BastionError::UnknownRole {
                role: entry.role.clone(),
            })
    }

    pub fn server_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.servers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn approval_required_patterns(&self) -> &[String] {
        &self.approval_required_patterns
    }
}
