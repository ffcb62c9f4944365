use async_trait::async_trait;

use crate::chat::{ContentBlock, Message, StopReason, Tool};
use crate::error::LLMError;

/// What the collaborator produced for one turn.
#[derive(Debug, Clone)]
pub struct AssistantTurn {
    pub content: Vec<ContentBlock>,
    pub stop_reason: StopReason,
}

/// The opaque LLM collaborator the conversation loop drives.
///
/// Everything about how this is implemented — which model, which HTTP
/// client, which wire format — is outside this crate's concern. The loop
/// only needs one call that may fail with [`LLMError::RateLimited`], which
/// its retry wrapper knows how to wait out.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    async fn chat(&self, messages: &[Message], tools: &[Tool]) -> Result<AssistantTurn, LLMError>;
}
