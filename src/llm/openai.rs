//! OpenAI chat completions client
//!
//! Also serves any OpenAI-compatible server (vLLM, LiteLLM, LM Studio) when a
//! custom base URL is configured. The API key is optional for self-hosted
//! endpoints.

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::openai_compat::{self, ChatRequest, ChatResponse};
use super::{LlmClient, LlmResponse, Message};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiClient {
    api_key: Option<String>,
    model: String,
    max_tokens: usize,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(
        api_key: Option<String>,
        model: String,
        max_tokens: usize,
        base_url: Option<String>,
    ) -> Self {
        Self {
            api_key,
            model,
            max_tokens,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn send_message_with_system(
        &self,
        messages: &[Message],
        system_prompt: Option<&str>,
    ) -> Result<LlmResponse> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: openai_compat::convert_messages(messages, system_prompt),
            max_tokens: Some(self.max_tokens),
        };

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));

        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .context("Failed to send request to OpenAI-compatible API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            anyhow::bail!("OpenAI API error ({}): {}", status, error_text);
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .context("Failed to parse OpenAI response")?;
        openai_compat::into_llm_response(chat_response, "OpenAI")
    }
}
