use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{Config, LlmProvider};

pub mod ollama;
pub mod openai;
pub mod openai_compat;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
}

/// Token usage information from LLM response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl TokenUsage {
    pub fn new(input_tokens: usize, output_tokens: usize) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }
}

/// Response from LLM including message and token usage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub message: Message,
    pub usage: Option<TokenUsage>,
}

impl LlmResponse {
    /// Concatenated text of every text block in the reply
    pub fn text(&self) -> String {
        self.message
            .content
            .iter()
            .map(|block| match block {
                ContentBlock::Text { text } => text.as_str(),
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Text-completion capability consumed by the planning core.
///
/// Providers implement `send_message_with_system`; planners only ever call
/// `complete`, so swapping providers never touches planning code.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send a conversation to the LLM with an optional system prompt
    async fn send_message_with_system(
        &self,
        messages: &[Message],
        system_prompt: Option<&str>,
    ) -> Result<LlmResponse>;

    /// Single-turn completion returning the reply text
    async fn complete(&self, prompt: &str, system_prompt: Option<&str>) -> Result<String> {
        let messages = vec![Message::user(prompt.to_string())];
        let response = self.send_message_with_system(&messages, system_prompt).await?;
        Ok(response.text())
    }
}

/// Create the provider-specific LLM client described by the configuration
pub fn create_client(config: &Config) -> Result<Box<dyn LlmClient>> {
    match config.llm.provider {
        LlmProvider::Ollama => {
            tracing::info!("Using Ollama model {}", config.llm.model);
            Ok(Box::new(ollama::OllamaClient::new(
                config.llm.base_url.clone(),
                config.llm.model.clone(),
                config.llm.max_tokens,
            )))
        }
        LlmProvider::OpenAI => {
            let api_key = config
                .llm
                .api_key
                .clone()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok())
                .context("OpenAI API key not set. Set OPENAI_API_KEY or configure api_key")?;
            Ok(Box::new(openai::OpenAiClient::new(
                Some(api_key),
                config.llm.model.clone(),
                config.llm.max_tokens,
                config.llm.base_url.clone(),
            )))
        }
        LlmProvider::OpenAIGeneric => {
            let base_url = config
                .llm
                .base_url
                .clone()
                .context("openai-generic requires a base_url to be set in configuration")?;
            tracing::info!("Using generic OpenAI-compatible API at {}", base_url);
            Ok(Box::new(openai::OpenAiClient::new(
                config.llm.api_key.clone(),
                config.llm.model.clone(),
                config.llm.max_tokens,
                Some(base_url),
            )))
        }
    }
}

impl Message {
    pub fn user(text: String) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::Text { text }],
        }
    }
}
