//! Chat-completions client, shared by the OpenAI API and the hosted IDE
//! assistant (which speaks the same wire shape).

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::decision::provider::{LlmProvider, ProviderError};

pub struct ChatCompletionsProvider {
    client: reqwest::Client,
    name: String,
    endpoint: String,
    api_key: SecretString,
    model: String,
}

impl ChatCompletionsProvider {
    /// `base_url` is the API root; `/v1/chat/completions` is appended unless
    /// the root already ends in `/v1`.
    pub fn new(name: &str, base_url: &str, api_key: SecretString, model: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build HTTP client");

        let root = base_url.trim_end_matches('/');
        let endpoint = if root.ends_with("/v1") {
            format!("{root}/chat/completions")
        } else {
            format!("{root}/v1/chat/completions")
        };

        Self {
            client,
            name: name.to_string(),
            endpoint,
            api_key,
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl LlmProvider for ChatCompletionsProvider {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self, system, user), fields(provider = %self.name))]
    async fn complete(&self, system: &str, user: &str) -> Result<String, ProviderError> {
        let request = ChatRequest {
            model: &self.model,
            temperature: 0.2,
            max_tokens: 300,
            messages: vec![
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: user },
            ],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status { status: status.as_u16(), body });
        }

        let payload: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        if let Some(usage) = &payload.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Chat completion finished"
            );
        }

        payload
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or(ProviderError::EmptyResponse)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: i64,
    completion_tokens: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(uri: &str) -> ChatCompletionsProvider {
        ChatCompletionsProvider::new("openai", uri, SecretString::from("sk-test"), "gpt-test", Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_complete_returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({"model": "gpt-test"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "{\"recommendation\":\"П1\"}"}}],
                "usage": {"prompt_tokens": 120, "completion_tokens": 20}
            })))
            .mount(&server)
            .await;

        let text = provider(&server.uri()).complete("sys", "user").await.unwrap();
        assert_eq!(text, "{\"recommendation\":\"П1\"}");
    }

    #[tokio::test]
    async fn test_complete_maps_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let err = provider(&server.uri()).complete("sys", "user").await.unwrap_err();
        assert!(matches!(err, ProviderError::Status { status: 429, .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_empty_choices_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})))
            .mount(&server)
            .await;

        let err = provider(&server.uri()).complete("sys", "user").await.unwrap_err();
        assert!(matches!(err, ProviderError::EmptyResponse));
    }

    #[test]
    fn test_endpoint_with_versioned_root() {
        let p = ChatCompletionsProvider::new(
            "ide-assistant",
            "http://localhost:9000/v1/",
            SecretString::from("t"),
            "m",
            Duration::from_secs(1),
        );
        assert_eq!(p.endpoint, "http://localhost:9000/v1/chat/completions");
    }
}
