//! Wire types shared between the conversation loop and the LLM collaborator.
//!
//! The LLM's own request/response protocol is not this crate's concern —
//! only the shape of messages and tool schemas that cross that boundary.

mod chat;
mod error;
mod provider;

pub use chat::{
    ChatRole, ContentBlock, FunctionTool, Message, MessageContent, StopReason, Tool,
};
pub use error::LLMError;
pub use provider::{AssistantTurn, LLMProvider};
