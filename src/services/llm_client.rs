//! Non-streaming chat completion client. Request/response shape,
//! retry-with-backoff, and semaphore acquire carried over from
//! `services/llm_service.rs`, with the streaming (SSE) path dropped — this
//! contract is single-shot request/response only.

use crate::services::prompt_engine::ChatMessage;
use crate::utils::error::ApiError;
use crate::utils::limiters::Limiters;
use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
struct ChatCompletionMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatCompletionMessage>,
    max_tokens: usize,
    temperature: f32,
    top_p: f32,
    repetition_penalty: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

const MAX_RETRIES: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_secs(2);
const BACKOFF_CAP: Duration = Duration::from_secs(10);

const DEFAULT_TEMPERATURE: f32 = 0.2;
const DEFAULT_TOP_P: f32 = 0.9;
const DEFAULT_REPETITION_PENALTY: f32 = 1.1;

pub struct LlmClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model_name: String,
    max_output_tokens: usize,
    limiters: Arc<Limiters>,
}

impl LlmClient {
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        model_name: String,
        timeout_seconds: u64,
        max_output_tokens: usize,
        limiters: Arc<Limiters>,
    ) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(timeout_seconds))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url,
            api_key,
            model_name,
            max_output_tokens,
            limiters,
        }
    }

    /// Qualifying failures (timeouts, connection errors) are the caller's
    /// signal to report to the circuit breaker; this method itself knows
    /// nothing about breaker state.
    pub async fn generate(&self, messages: &[ChatMessage]) -> Result<String, ApiError> {
        self.generate_with_retry(messages)
            .await
            .map_err(|e| ApiError::GenerationError(e.to_string()))
    }

    async fn generate_with_retry(&self, messages: &[ChatMessage]) -> Result<String> {
        let mut attempt = 0u32;
        let mut backoff = BACKOFF_BASE;

        loop {
            attempt += 1;
            match self.generate_once(messages).await {
                Ok(text) => return Ok(text),
                Err(e) if attempt >= MAX_RETRIES => {
                    return Err(e).context(format!("generation failed after {attempt} attempts"));
                }
                Err(e) => {
                    warn!(attempt, error = %e, "generation call failed, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(BACKOFF_CAP);
                }
            }
        }
    }

    async fn generate_once(&self, messages: &[ChatMessage]) -> Result<String> {
        let (_permit, wait) = Limiters::acquire_timed(
            self.limiters.llm_generate.clone(),
            self.limiters.acquire_timeout,
            "llm_generate",
        )
        .await?;
        debug!(wait_ms = wait.as_millis() as u64, "llm limiter wait");

        let exec_start = Instant::now();

        let request = ChatCompletionRequest {
            model: self.model_name.clone(),
            messages: messages
                .iter()
                .map(|m| ChatCompletionMessage {
                    role: m.role.to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            max_tokens: self.max_output_tokens,
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
            repetition_penalty: DEFAULT_REPETITION_PENALTY,
        };

        let url = format!("{}/v1/chat/completions", self.base_url);
        let mut request_builder = self.client.post(&url);
        if let Some(key) = &self.api_key {
            request_builder = request_builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = request_builder
            .json(&request)
            .send()
            .await
            .context("failed to connect to generation server")?;

        debug!(exec_ms = exec_start.elapsed().as_millis() as u64, "llm exec");

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("generation API error ({}): {}", status, body);
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .context("failed to parse generation response")?;

        let raw = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        let cleaned = Self::strip_role_markers(&raw);

        if cleaned.trim().is_empty() {
            anyhow::bail!("generation server returned an empty response");
        }

        let user_content = messages.iter().find(|m| m.role == "user").map(|m| m.content.as_str()).unwrap_or("");
        if !user_content.is_empty() && cleaned.trim() == user_content.trim() {
            anyhow::bail!("generation server echoed the input verbatim");
        }

        Ok(cleaned)
    }

    /// Strips leading role-marker artifacts (`"Assistant:"`, `"AI:"`) that
    /// some backends prepend to completions despite the chat-shaped request.
    fn strip_role_markers(text: &str) -> String {
        let trimmed = text.trim();
        for marker in ["Assistant:", "assistant:", "AI:", "ai:"] {
            if let Some(rest) = trimmed.strip_prefix(marker) {
                return rest.trim().to_string();
            }
        }
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_role_markers_removes_known_prefixes() {
        assert_eq!(LlmClient::strip_role_markers("Assistant: grace abounds"), "grace abounds");
        assert_eq!(LlmClient::strip_role_markers("plain answer"), "plain answer");
    }
}
