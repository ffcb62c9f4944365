//! Agent behavior configuration.
//!
//! Loaded as TOML into a single frozen [`BastionConfig`] tree; missing
//! sections fall back to their `Default`.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::BastionError;

/// How the agent handles destructive-operation approvals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMode {
    Interactive,
    AutoDeny,
}

impl Default for ApprovalMode {
    fn default() -> Self {
        ApprovalMode::Interactive
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_retries: usize,
    pub base_delay_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_secs: 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub command_timeout_secs: u64,
    pub ssh_connect_timeout_secs: u64,
    pub max_tool_iterations: usize,
    pub max_conversation_tokens: usize,
    pub tool_result_truncate_chars: usize,
    pub rate_limit: RateLimitConfig,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: 30,
            ssh_connect_timeout_secs: 10,
            max_tool_iterations: 10,
            max_conversation_tokens: 100_000,
            tool_result_truncate_chars: 3_000,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub path: PathBuf,
    pub max_field_len: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./logs/audit.jsonl"),
            max_field_len: 2_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub socket_path: PathBuf,
    pub sessions_dir: PathBuf,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from("/run/bastion-agent/agent.sock"),
            sessions_dir: PathBuf::from("./sessions"),
        }
    }
}

/// Root configuration object. Read once at startup, then treated as
/// read-only by every subsystem — same contract as [`crate::inventory::Inventory`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BastionConfig {
    pub model: String,
    pub inventory_path: PathBuf,
    pub approval_mode: ApprovalMode,
    pub audit: AuditConfig,
    pub execution: ExecutionConfig,
    pub daemon: DaemonConfig,
}

impl Default for BastionConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-5-20250929".to_string(),
            inventory_path: PathBuf::from("./servers.toml"),
            approval_mode: ApprovalMode::default(),
            audit: AuditConfig::default(),
            execution: ExecutionConfig::default(),
            daemon: DaemonConfig::default(),
        }
    }
}

impl BastionConfig {
    /// Load `config_dir/agent.toml`, falling back to all-default config
    /// when the file is absent. `config_dir` itself is resolved by the
    /// caller from `--config-dir`/`BASTION_AGENT_CONFIG`/the XDG default,
    /// in that priority order — this function only makes relative paths
    /// inside the loaded config (like `inventory_path`) absolute against it.
    pub fn load(config_dir: &Path) -> Result<Self, BastionError> {
        if !config_dir.is_dir() {
            return Err(BastionError::ConfigDirNotFound {
                path: config_dir.display().to_string(),
            });
        }

        let agent_toml = config_dir.join("agent.toml");
        let mut config = if agent_toml.exists() {
            let text = std::fs::read_to_string(&agent_toml)?;
            toml::from_str::<BastionConfig>(&text).map_err(|e| {
                BastionError::ConfigParse(format!("{}: {e}", agent_toml.display()))
            })?
        } else {
            BastionConfig::default()
        };

        if config.inventory_path.is_relative() {
            config.inventory_path = config_dir.join(&config.inventory_path);
        }

        Ok(config)
    }
}
