//! Core agent crate: the security pipeline (sanitizer, allowlist,
//! approval gate, audit log) and everything built on top of it (the
//! dispatch kernel, the conversation loop, session persistence, and the
//! daemon transport).
//!
//! None of this crate talks to a specific LLM vendor or renders a
//! terminal UI — it is driven by whatever implements
//! [`bastion_core::LLMProvider`] and whatever implements
//! [`events::EventSink`], both supplied by the `bastion-cli` binary.

use std::sync::Arc;

pub mod allowlist;
pub mod approval;
pub mod audit;
pub mod config;
pub mod conversation;
pub mod daemon;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod history;
pub mod inventory;
pub mod llm_retry;
pub mod sanitizer;
pub mod session;
pub mod tools;

pub use config::{ApprovalMode, AuditConfig, BastionConfig, DaemonConfig, ExecutionConfig, RateLimitConfig};
pub use conversation::ConversationLoop;
pub use daemon::Daemon;
pub use dispatch::DispatchKernel;
pub use error::BastionError;
pub use events::{EventSink, LoopEvent, NullSink, StdoutSink};
pub use inventory::Inventory;
pub use session::Session;

/// Register every built-in tool with a freshly constructed
/// [`DispatchKernel`]. Split out from `DispatchKernel::new` so tests and
/// narrowly-scoped tools (e.g. an integration test exercising a single
/// tool) aren't forced to carry the whole built-in set.
pub fn register_builtin_tools(kernel: &mut DispatchKernel) -> Result<(), BastionError> {
    use tools::builtins::*;

    kernel.register(Arc::new(ListServersTool))?;
    kernel.register(Arc::new(LocalCommandTool))?;
    kernel.register(Arc::new(RemoteCommandTool))?;
    kernel.register(Arc::new(ReadFileTool))?;
    kernel.register(Arc::new(DockerPsTool))?;
    kernel.register(Arc::new(DockerLogsTool))?;
    kernel.register(Arc::new(ServiceStatusTool))?;
    kernel.register(Arc::new(ServiceJournalTool))?;
    kernel.register(Arc::new(ServerStatusTool))?;
    kernel.register(Arc::new(QueryMetricsTool))?;
    Ok(())
}
