use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::generator::{Completion, Generator};
use crate::config::LlmConfig;

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: usize,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

/// `Generator` backed by an OpenAI-compatible chat-completions endpoint.
#[derive(Clone)]
pub struct LlmService {
    client: Client,
    config: LlmConfig,
}

impl LlmService {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(secs) = config.timeout_seconds {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build().context("Failed to create HTTP client")?;

        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl Generator for LlmService {
    async fn complete(&self, prompt: &str) -> Result<Completion> {
        debug!(model = %self.config.model, prompt_chars = prompt.len(), "Requesting completion");

        let request = ChatCompletionRequest {
            model: &self.config.model,
            messages: vec![ChatMessage { role: "user", content: prompt }],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            stream: false,
        };

        let mut call = self.client.post(self.endpoint()).json(&request);
        if let Some(key) = &self.config.api_key {
            call = call.bearer_auth(key);
        }

        let response = call.send().await.context("Failed to call LLM API")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("LLM API error: {} - {}", status, body));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .context("Failed to parse LLM response")?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No choices returned from LLM"))?
            .message
            .content
            .unwrap_or_default();

        debug!(
            prompt_tokens = parsed.usage.prompt_tokens,
            completion_tokens = parsed.usage.completion_tokens,
            "Completion received"
        );

        Ok(Completion {
            text,
            prompt_tokens: parsed.usage.prompt_tokens,
            completion_tokens: parsed.usage.completion_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> LlmConfig {
        LlmConfig {
            base_url: server.uri(),
            model: "test-model".to_string(),
            api_key: Some("sk-test".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_complete_returns_text_and_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "test-model",
                "max_tokens": 500,
                "messages": [{"role": "user", "content": "Why is the flash green?"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "Refraction."}}],
                "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let service = LlmService::new(config_for(&server)).unwrap();
        let completion = service.complete("Why is the flash green?").await.unwrap();

        assert_eq!(
            completion,
            Completion { text: "Refraction.".to_string(), prompt_tokens: 12, completion_tokens: 3 }
        );
    }

    #[tokio::test]
    async fn test_error_status_carries_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let service = LlmService::new(config_for(&server)).unwrap();
        let err = service.complete("q").await.unwrap_err().to_string();
        assert!(err.contains("429"));
        assert!(err.contains("rate limited"));
    }

    #[tokio::test]
    async fn test_empty_choices_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let service = LlmService::new(config_for(&server)).unwrap();
        assert!(service.complete("q").await.is_err());
    }
}
