//! Concrete [`LLMProvider`] talking to Anthropic's Messages API over HTTP.
//!
//! `bastion-core` only declares the trait the conversation loop drives —
//! this binary supplies the one real implementation, the way a thin CLI
//! wires a concrete provider onto an otherwise-provider-agnostic core.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use bastion_core::{
    AssistantTurn, ChatRole, ContentBlock, LLMError, LLMProvider, Message, MessageContent,
    StopReason, Tool,
};

const API_BASE: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicProvider {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            max_tokens: 4096,
        }
    }
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<AnthropicToolDef>>,
}

#[derive(Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: Vec<AnthropicContentIn>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicContentIn {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

#[derive(Serialize)]
struct AnthropicToolDef {
    name: String,
    description: String,
    input_schema: Value,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentOut>,
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicContentOut {
    Text { text: String },
    ToolUse { id: String, name: String, input: Value },
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize)]
struct AnthropicErrorBody {
    error: AnthropicErrorDetail,
}

#[derive(Deserialize)]
struct AnthropicErrorDetail {
    message: String,
}

fn to_wire_message(message: &Message) -> AnthropicMessage {
    let role = match message.role {
        ChatRole::User => "user",
        ChatRole::Assistant => "assistant",
    };
    let content = match &message.content {
        MessageContent::Text(text) => vec![AnthropicContentIn::Text { text: text.clone() }],
        MessageContent::Blocks(blocks) => blocks
            .iter()
            .map(|block| match block {
                ContentBlock::Text { text } => AnthropicContentIn::Text { text: text.clone() },
                ContentBlock::ToolUse { id, name, input } => AnthropicContentIn::ToolUse {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                },
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                } => AnthropicContentIn::ToolResult {
                    tool_use_id: tool_use_id.clone(),
                    content: content.clone(),
                    is_error: *is_error,
                },
            })
            .collect(),
    };
    AnthropicMessage { role, content }
}

fn to_wire_tool(tool: &Tool) -> AnthropicToolDef {
    match tool {
        Tool::Function(f) => AnthropicToolDef {
            name: f.name.clone(),
            description: f.description.clone(),
            input_schema: f.parameters.clone(),
        },
    }
}

fn stop_reason_from_wire(raw: Option<&str>) -> StopReason {
    match raw {
        Some("end_turn") | Some("stop_sequence") => StopReason::EndTurn,
        Some("tool_use") => StopReason::ToolUse,
        Some("max_tokens") => StopReason::MaxTokens,
        Some(other) => StopReason::Other(other.to_string()),
        None => StopReason::EndTurn,
    }
}

#[async_trait]
impl LLMProvider for AnthropicProvider {
    async fn chat(&self, messages: &[Message], tools: &[Tool]) -> Result<AssistantTurn, LLMError> {
        let body = AnthropicRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: messages.iter().map(to_wire_message).collect(),
            tools: if tools.is_empty() {
                None
            } else {
                Some(tools.iter().map(to_wire_tool).collect())
            },
        };

        let response = self
            .client
            .post(API_BASE)
            .header("content-type", "application/json")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| LLMError::HttpError(e.to_string()))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = parse_retry_after(&response);
            return Err(LLMError::RateLimited {
                message: "Anthropic API rate limit exceeded".to_string(),
                retry_after_secs,
            });
        }

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<AnthropicErrorBody>(&text)
                .map(|b| b.error.message)
                .unwrap_or(text);
            return Err(LLMError::ProviderError(format!("HTTP {status}: {message}")));
        }

        let parsed: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| LLMError::HttpError(format!("failed to parse response: {e}")))?;

        let content = parsed
            .content
            .into_iter()
            .filter_map(|block| match block {
                AnthropicContentOut::Text { text } => Some(ContentBlock::Text { text }),
                AnthropicContentOut::ToolUse { id, name, input } => {
                    Some(ContentBlock::ToolUse { id, name, input })
                }
                AnthropicContentOut::Unknown => None,
            })
            .collect();

        Ok(AssistantTurn {
            content,
            stop_reason: stop_reason_from_wire(parsed.stop_reason.as_deref()),
        })
    }
}

fn parse_retry_after(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
}
