//! LLM provider seam and startup selection.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::config::{DecisionConfig, Secrets};
use crate::decision::claude::ClaudeProvider;
use crate::decision::openai::ChatCompletionsProvider;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("provider returned no text")]
    EmptyResponse,

    #[error("undecodable provider payload: {0}")]
    Decode(String),
}

impl ProviderError {
    /// Client errors other than throttling will not succeed on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => !matches!(status, 400 | 401 | 403 | 404 | 422),
            Self::Transport(_) | Self::EmptyResponse | Self::Decode(_) => true,
        }
    }
}

/// A chat-style model that turns a system + user prompt into text.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, system: &str, user: &str) -> Result<String, ProviderError>;
}

/// Pick the single active provider: hosted IDE assistant, then OpenAI, then
/// Anthropic. `None` means every decision goes through the heuristic.
pub fn select_provider(config: &DecisionConfig, secrets: &Secrets) -> Option<Box<dyn LlmProvider>> {
    let flags = secrets.flags;
    if !config.llm_enabled || flags.disable_llm {
        info!("LLM providers disabled — heuristic decisions only");
        return None;
    }

    let timeout = Duration::from_secs(config.request_timeout_seconds);

    if flags.enable_ide_assistant {
        if let (Some(url), Some(token)) = (&secrets.ide_assistant_url, &secrets.ide_assistant_token) {
            info!(provider = "ide-assistant", "LLM provider selected");
            return Some(Box::new(ChatCompletionsProvider::new(
                "ide-assistant",
                url,
                token.clone(),
                &config.ide_model,
                timeout,
            )));
        }
    }

    if !flags.disable_openai {
        if let Some(key) = &secrets.openai_api_key {
            info!(provider = "openai", model = %config.openai_model, "LLM provider selected");
            return Some(Box::new(ChatCompletionsProvider::new(
                "openai",
                &config.openai_base_url,
                key.clone(),
                &config.openai_model,
                timeout,
            )));
        }
    }

    if !flags.disable_anthropic {
        if let Some(key) = &secrets.anthropic_api_key {
            info!(provider = "anthropic", model = %config.anthropic_model, "LLM provider selected");
            return Some(Box::new(ClaudeProvider::new(
                &config.anthropic_base_url,
                key.clone(),
                &config.anthropic_model,
                timeout,
            )));
        }
    }

    info!("No LLM credentials available — heuristic decisions only");
    None
}
