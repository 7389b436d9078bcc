//! Shared wire types for OpenAI-compatible chat completion endpoints
//!
//! Both the Ollama and OpenAI clients speak `/v1/chat/completions`; only the
//! base URL and authentication differ.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::{ContentBlock, LlmResponse, Message, Role, TokenUsage};

#[derive(Debug, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponseMessage {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatUsage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

/// Flatten internal messages into chat messages, prepending the system prompt
pub fn convert_messages(messages: &[Message], system_prompt: Option<&str>) -> Vec<ChatMessage> {
    let mut result = Vec::with_capacity(messages.len() + 1);

    if let Some(system) = system_prompt {
        result.push(ChatMessage {
            role: "system".to_string(),
            content: system.to_string(),
        });
    }

    for msg in messages {
        let role = match msg.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        let content = msg
            .content
            .iter()
            .map(|block| match block {
                ContentBlock::Text { text } => text.as_str(),
            })
            .collect::<Vec<_>>()
            .join("\n");
        result.push(ChatMessage {
            role: role.to_string(),
            content,
        });
    }

    result
}

/// Convert the first choice of a chat response into an `LlmResponse`
pub fn into_llm_response(response: ChatResponse, provider: &str) -> Result<LlmResponse> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("No response from {}", provider))?;

    let text = choice.message.content.unwrap_or_default();

    Ok(LlmResponse {
        message: Message {
            role: Role::Assistant,
            content: vec![ContentBlock::Text { text }],
        },
        usage: response
            .usage
            .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens)),
    })
}
