//! OpenAI-compatible Chat Completions translation provider
//!
//! Works against api.openai.com or any compatible endpoint (override via
//! `OPENAI_BASE_URL`). Requests JSON mode where the backend supports it;
//! the shared protocol still validates and repairs output, so backends
//! that ignore `response_format` degrade gracefully.

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::time::sleep;
use tracing::debug;

use crate::error::{Result, TransmemError};
use crate::provider::protocol::{Completion, drive_batch};
use crate::provider::{BatchRequest, ProviderReply, ProviderResponse, TranslationProvider};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const TEMPERATURE: f64 = 0.1;

/// Chat Completions API provider
#[derive(Clone)]
pub struct OpenAiProvider {
    api_key: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
    max_retries: u32,
    retry_delay: Duration,
}

impl OpenAiProvider {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(TransmemError::Config(
                "OpenAI API key cannot be empty".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| TransmemError::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(OpenAiProvider {
            api_key,
            base_url: env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            model: env::var("OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            client,
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
        })
    }

    /// Create a provider from the `OPENAI_API_KEY` environment variable
    pub fn from_env() -> Result<Self> {
        let api_key = env::var("OPENAI_API_KEY").map_err(|_| {
            TransmemError::Config("OPENAI_API_KEY environment variable not set".to_string())
        })?;
        Self::new(api_key)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.retry_delay * 2u32.saturating_pow(attempt)
    }

    async fn call_chat_completions(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let payload = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": TEMPERATURE,
            "response_format": {"type": "json_object"},
        });

        let mut last_error = String::new();

        for attempt in 0..=self.max_retries {
            let response = match self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&payload)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    last_error = e.to_string();
                    if attempt < self.max_retries {
                        sleep(self.backoff(attempt)).await;
                        continue;
                    }
                    return Err(TransmemError::Transport(format!(
                        "request failed after {} retries: {}",
                        self.max_retries, last_error
                    )));
                }
            };

            let status = response.status();

            if status.as_u16() == 429 {
                let wait = response
                    .headers()
                    .get("retry-after")
                    .and_then(|value| value.to_str().ok())
                    .and_then(|value| value.parse::<f64>().ok())
                    .filter(|secs| *secs >= 0.0)
                    .map(Duration::from_secs_f64)
                    .unwrap_or_else(|| self.backoff(attempt));
                let body = response.text().await.unwrap_or_default();

                if attempt < self.max_retries {
                    debug!(wait_secs = wait.as_secs_f64(), "rate limited, backing off");
                    sleep(wait).await;
                    continue;
                }
                return Err(TransmemError::RateLimited(format!(
                    "rate limit still in effect after {} retries: {}",
                    self.max_retries, body
                )));
            }

            if status.as_u16() == 401 || status.as_u16() == 403 {
                let body = response.text().await.unwrap_or_default();
                return Err(TransmemError::Auth(format!(
                    "OpenAI API rejected credentials ({}): {}",
                    status, body
                )));
            }

            if status.is_server_error() {
                let _ = response.text().await;
                if attempt < self.max_retries {
                    sleep(self.backoff(attempt)).await;
                    continue;
                }
                return Err(TransmemError::Transport(format!(
                    "server error {} after {} retries",
                    status, self.max_retries
                )));
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(TransmemError::Transport(format!(
                    "OpenAI API error ({}): {}",
                    status, body
                )));
            }

            let body: Value = response.json().await?;
            return extract_choice_text(&body);
        }

        Err(TransmemError::Transport(last_error))
    }
}

/// Pull the assistant message text out of a Chat Completions response
fn extract_choice_text(body: &Value) -> Result<String> {
    let choices = body["choices"]
        .as_array()
        .filter(|choices| !choices.is_empty())
        .ok_or_else(|| {
            TransmemError::Transport("OpenAI API response missing choices".to_string())
        })?;

    choices[0]["message"]["content"]
        .as_str()
        .map(|text| text.trim().to_string())
        .ok_or_else(|| {
            TransmemError::Transport("OpenAI API response missing message content".to_string())
        })
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("api_key", &"***")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

#[async_trait]
impl Completion for OpenAiProvider {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.call_chat_completions(prompt).await
    }
}

#[async_trait]
impl TranslationProvider for OpenAiProvider {
    async fn translate_batch(&self, request: &BatchRequest) -> Result<ProviderReply> {
        if request.items.is_empty() {
            return Ok(ProviderReply::clean(ProviderResponse::empty(
                &request.target_lang,
            )));
        }

        drive_batch(self, request).await
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_blank_key() {
        assert!(matches!(
            OpenAiProvider::new(""),
            Err(TransmemError::Config(_))
        ));
        assert!(OpenAiProvider::new("  ").is_err());
    }

    #[test]
    fn test_with_model_overrides_default() {
        let provider = OpenAiProvider::new("k").unwrap().with_model("gpt-4o");
        assert_eq!(provider.model, "gpt-4o");
    }

    #[test]
    fn test_backoff_is_exponential() {
        let provider = OpenAiProvider::new("k").unwrap();
        assert_eq!(provider.backoff(0), Duration::from_secs(1));
        assert_eq!(provider.backoff(2), Duration::from_secs(4));
    }

    #[test]
    fn test_extract_choice_text() {
        let body = json!({"choices": [{"message": {"content": " {\"a\":1} "}}]});
        assert_eq!(extract_choice_text(&body).unwrap(), "{\"a\":1}");
    }

    #[test]
    fn test_extract_choice_text_missing_choices() {
        assert!(extract_choice_text(&json!({"choices": []})).is_err());
        assert!(extract_choice_text(&json!({})).is_err());
    }

    #[test]
    fn test_debug_masks_api_key() {
        let provider = OpenAiProvider::new("sk-secret").unwrap();
        let debug = format!("{:?}", provider);
        assert!(!debug.contains("sk-secret"));
    }

    #[tokio::test]
    async fn test_empty_batch_short_circuits() {
        let provider = OpenAiProvider::new("k").unwrap();
        let request = BatchRequest {
            source_lang: "sv".to_string(),
            target_lang: "fr".to_string(),
            items: Vec::new(),
            global_context: None,
            per_key_context: Default::default(),
        };
        let reply = provider.translate_batch(&request).await.unwrap();
        assert!(reply.response.translations.is_empty());
    }
}
