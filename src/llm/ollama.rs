use anyhow::Result;
use async_trait::async_trait;

use super::openai_compat::{self, ChatRequest, ChatResponse};
use super::{LlmClient, LlmResponse, Message};

pub struct OllamaClient {
    base_url: String,
    model: String,
    max_tokens: usize,
    client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(base_url: Option<String>, model: String, max_tokens: usize) -> Self {
        Self {
            base_url: base_url.unwrap_or_else(|| "http://localhost:11434".to_string()),
            model,
            max_tokens,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
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

        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            anyhow::bail!("Ollama API error ({}): {}", status, error_text);
        }

        let chat_response: ChatResponse = response.json().await?;
        openai_compat::into_llm_response(chat_response, "Ollama")
    }
}
