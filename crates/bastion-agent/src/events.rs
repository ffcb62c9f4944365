//! The conversation loop's output is sunk through this trait rather than
//! printed directly, so the same loop drives both the interactive terminal
//! and the daemon's wire protocol. The concrete renderers (a pretty
//! terminal view, the JSON-lines socket writer) live outside this crate's
//! core concern — see §1's "out of scope" list.

use serde_json::Value;

/// One thing the conversation loop wants to tell the outside world about.
#[derive(Debug, Clone)]
pub enum LoopEvent {
    /// Final or interim assistant text.
    Response(String),
    /// The assistant requested a tool call.
    ToolCall { tool: String, input: Value },
    /// A tool call's result, after dispatch.
    ToolResult { tool: String, result: Value },
    /// A user-visible error (API error, safety stop, etc).
    Error(String),
    /// Advisory/informational notice (rate-limit backoff, resume, ...).
    Info(String),
}

/// Sink for [`LoopEvent`]s. Implementations must not block the tokio
/// runtime — the interactive sink writes to stdout synchronously (cheap),
/// the daemon sink writes a JSON line to a socket.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: LoopEvent);
}

/// Prints events to stdout, used by the interactive `run` CLI command.
pub struct StdoutSink;

impl EventSink for StdoutSink {
    fn emit(&self, event: LoopEvent) {
        match event {
            LoopEvent::Response(text) => println!("{text}"),
            LoopEvent::ToolCall { tool, input } => println!("-> {tool}({input})"),
            LoopEvent::ToolResult { tool, result } => println!("<- {tool}: {result}"),
            LoopEvent::Error(text) => eprintln!("error: {text}"),
            LoopEvent::Info(text) => println!("[info] {text}"),
        }
    }
}

/// Drops every event. Used by tests that only care about history state.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: LoopEvent) {}
}
