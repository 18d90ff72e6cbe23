//! Claude (Anthropic Messages API) translation provider
//!
//! Two submission modes:
//!
//! - **Synchronous** - one Messages request per batch, driven through the
//!   shared translate/validate/repair protocol.
//! - **Asynchronous** - for large runs, one message-batch submission per
//!   batch; the provider polls the batch status endpoint at a fixed
//!   interval until a terminal state is observed or a wall-clock ceiling
//!   is exceeded, then fetches the JSONL results.
//!
//! # Authentication
//!
//! The API key is read from `ANTHROPIC_API_KEY`; base URL and model can
//! be overridden via `ANTHROPIC_BASE_URL` and `ANTHROPIC_MODEL`.
//!
//! # Error policy
//!
//! 429 is retried honoring the `retry-after` hint when present, else
//! exponential backoff; 401/403 fail immediately and are never retried;
//! timeouts and 5xx are retried with exponential backoff up to the
//! ceiling, then fail the call hard.

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{Result, TransmemError};
use crate::prompts::build_translation_prompt;
use crate::provider::protocol::{Completion, drive_batch};
use crate::provider::util::{extract_json_from_response, fix_token_escaping};
use crate::provider::{
    BatchRequest, ProviderReply, ProviderResponse, TranslationProvider,
};
use crate::schema::{ResponseValidation, validate_response_text};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;
const TEMPERATURE: f64 = 0.1;

/// Anthropic Messages API provider
#[derive(Clone)]
pub struct ClaudeProvider {
    api_key: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
    max_retries: u32,
    retry_delay: Duration,
    poll_interval: Duration,
    max_poll_wait: Duration,
    use_batch_api: bool,
    batch_threshold: usize,
}

impl ClaudeProvider {
    /// Create a provider with an explicit API key
    ///
    /// # Errors
    ///
    /// [`TransmemError::Config`] for a blank key or an unconstructible
    /// HTTP client.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(TransmemError::Config(
                "Anthropic API key cannot be empty".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| TransmemError::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(ClaudeProvider {
            api_key,
            base_url: env::var("ANTHROPIC_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            model: env::var("ANTHROPIC_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            client,
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            poll_interval: Duration::from_secs(60),
            max_poll_wait: Duration::from_secs(24 * 3600),
            use_batch_api: false,
            batch_threshold: 100,
        })
    }

    /// Create a provider from the `ANTHROPIC_API_KEY` environment variable
    pub fn from_env() -> Result<Self> {
        let api_key = env::var("ANTHROPIC_API_KEY").map_err(|_| {
            TransmemError::Config("ANTHROPIC_API_KEY environment variable not set".to_string())
        })?;
        Self::new(api_key)
    }

    /// Override the model name
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Force the asynchronous batch API for every submission
    pub fn with_batch_api(mut self, use_batch_api: bool) -> Self {
        self.use_batch_api = use_batch_api;
        self
    }

    /// Tune the status-poll interval and wall-clock ceiling
    pub fn with_polling(mut self, interval: Duration, ceiling: Duration) -> Self {
        self.poll_interval = interval;
        self.max_poll_wait = ceiling;
        self
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.retry_delay * 2u32.saturating_pow(attempt)
    }

    /// POST one Messages request, with transport retry and backoff
    async fn call_messages(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/messages", self.base_url);
        let payload = json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": TEMPERATURE,
        });

        let mut last_error = String::new();

        for attempt in 0..=self.max_retries {
            let response = match self
                .client
                .post(&url)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
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
                    "Anthropic API rejected credentials ({}): {}",
                    status, body
                )));
            }

            if status.is_server_error() {
                last_error = format!("server error {}", status);
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
                    "Anthropic API error ({}): {}",
                    status, body
                )));
            }

            let body: Value = response.json().await?;
            return extract_message_text(&body);
        }

        Err(TransmemError::Transport(last_error))
    }

    /// Submit a message batch and return its id
    async fn create_batch(&self, requests: &[Value]) -> Result<String> {
        let url = format!("{}/messages/batches", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&json!({"requests": requests}))
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            let body = response.text().await.unwrap_or_default();
            return Err(TransmemError::Auth(format!(
                "Anthropic API rejected credentials ({}): {}",
                status, body
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransmemError::Transport(format!(
                "failed to create batch ({}): {}",
                status, body
            )));
        }

        let body: Value = response.json().await?;
        body["id"]
            .as_str()
            .map(|id| id.to_string())
            .ok_or_else(|| {
                TransmemError::Transport("batch creation response missing 'id'".to_string())
            })
    }

    async fn get_batch_status(&self, batch_id: &str) -> Result<Value> {
        let url = format!("{}/messages/batches/{}", self.base_url, batch_id);
        let response = self
            .client
            .get(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TransmemError::Transport(format!(
                "failed to get batch status ({}): {}",
                status, body
            )));
        }

        Ok(response.json().await?)
    }

    /// Poll until the batch reaches a terminal state or the ceiling hits
    async fn poll_batch(&self, batch_id: &str) -> Result<Value> {
        let started = std::time::Instant::now();

        loop {
            let status = self.get_batch_status(batch_id).await?;
            match status["processing_status"].as_str() {
                Some("ended") => return Ok(status),
                Some(terminal @ ("expired" | "canceled" | "cancelled")) => {
                    return Err(TransmemError::Transport(format!(
                        "batch {} {}",
                        batch_id, terminal
                    )));
                }
                _ => {}
            }

            if started.elapsed() > self.max_poll_wait {
                return Err(TransmemError::Transport(format!(
                    "batch {} exceeded max wait of {}s",
                    batch_id,
                    self.max_poll_wait.as_secs()
                )));
            }

            sleep(self.poll_interval).await;
        }
    }

    async fn get_batch_results(&self, results_url: &str) -> Result<Vec<Value>> {
        let response = self
            .client
            .get(results_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TransmemError::Transport(format!(
                "failed to retrieve batch results ({}): {}",
                status, body
            )));
        }

        let text = response.text().await?;
        let mut results = Vec::new();
        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            results.push(serde_json::from_str(line)?);
        }
        Ok(results)
    }

    /// Asynchronous submission: one request per item, poll, collect
    async fn translate_batch_async(&self, request: &BatchRequest) -> Result<ProviderReply> {
        let mut submissions = Vec::with_capacity(request.items.len());
        for (index, item) in request.items.iter().enumerate() {
            let single = BatchRequest {
                source_lang: request.source_lang.clone(),
                target_lang: request.target_lang.clone(),
                items: vec![item.clone()],
                global_context: request.global_context.clone(),
                per_key_context: request
                    .per_key_context
                    .get(&item.key)
                    .map(|context| {
                        let mut map = std::collections::BTreeMap::new();
                        map.insert(item.key.clone(), context.clone());
                        map
                    })
                    .unwrap_or_default(),
            };

            submissions.push(json!({
                "custom_id": format!("item-{}-{}", index, item.key),
                "params": {
                    "model": self.model,
                    "max_tokens": MAX_TOKENS,
                    "messages": [{"role": "user", "content": build_translation_prompt(&single)}],
                    "temperature": TEMPERATURE,
                },
            }));
        }

        let batch_id = self.create_batch(&submissions).await?;
        debug!(batch_id = %batch_id, items = request.items.len(), "submitted message batch");

        let status = self.poll_batch(&batch_id).await?;
        let results_url = status["results_url"].as_str().ok_or_else(|| {
            TransmemError::Transport(format!(
                "batch {} completed but no results_url provided",
                batch_id
            ))
        })?;

        let mut translations = Vec::new();
        for result in self.get_batch_results(results_url).await? {
            if result.get("error").is_some() {
                warn!(custom_id = result["custom_id"].as_str().unwrap_or(""), "batch item failed");
                continue;
            }

            let Ok(text) = extract_message_text(&result["output"]) else {
                continue;
            };

            let candidate = fix_token_escaping(&extract_json_from_response(&text));
            if let ResponseValidation::WellFormed(response) = validate_response_text(&candidate) {
                translations.extend(response.translations);
            }
        }

        Ok(ProviderReply::clean(ProviderResponse {
            target_language: request.target_lang.clone(),
            translations,
        }))
    }
}

/// Pull the text of the first content block out of a Messages response
fn extract_message_text(body: &Value) -> Result<String> {
    let blocks = body["content"].as_array().ok_or_else(|| {
        TransmemError::Transport("Anthropic API response missing content".to_string())
    })?;
    let first = blocks.first().ok_or_else(|| {
        TransmemError::Transport("Anthropic API response has empty content".to_string())
    })?;

    if first["type"].as_str() != Some("text") {
        return Err(TransmemError::Transport(format!(
            "Anthropic API returned non-text content: {}",
            first["type"].as_str().unwrap_or("unknown")
        )));
    }

    Ok(first["text"].as_str().unwrap_or_default().trim().to_string())
}

impl std::fmt::Debug for ClaudeProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaudeProvider")
            .field("api_key", &"***")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("use_batch_api", &self.use_batch_api)
            .finish()
    }
}

#[async_trait]
impl Completion for ClaudeProvider {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.call_messages(prompt).await
    }
}

#[async_trait]
impl TranslationProvider for ClaudeProvider {
    async fn translate_batch(&self, request: &BatchRequest) -> Result<ProviderReply> {
        if request.items.is_empty() {
            return Ok(ProviderReply::clean(ProviderResponse::empty(
                &request.target_lang,
            )));
        }

        if self.use_batch_api || request.items.len() > self.batch_threshold {
            self.translate_batch_async(request).await
        } else {
            drive_batch(self, request).await
        }
    }

    fn name(&self) -> &str {
        "claude"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========== Construction Tests ==========

    #[test]
    fn test_new_with_valid_key() {
        let provider = ClaudeProvider::new("test-key");
        assert!(provider.is_ok());
        assert_eq!(provider.unwrap().name(), "claude");
    }

    #[test]
    fn test_new_with_empty_key() {
        let result = ClaudeProvider::new("");
        assert!(matches!(result, Err(TransmemError::Config(_))));
    }

    #[test]
    fn test_new_with_whitespace_key() {
        assert!(ClaudeProvider::new("   ").is_err());
    }

    #[test]
    fn test_builder_overrides() {
        let provider = ClaudeProvider::new("k")
            .unwrap()
            .with_model("claude-3-haiku")
            .with_batch_api(true);
        assert_eq!(provider.model, "claude-3-haiku");
        assert!(provider.use_batch_api);
    }

    #[test]
    fn test_debug_masks_api_key() {
        let provider = ClaudeProvider::new("secret-key").unwrap();
        let debug = format!("{:?}", provider);
        assert!(debug.contains("***"));
        assert!(!debug.contains("secret-key"));
    }

    // ========== Backoff Tests ==========

    #[test]
    fn test_backoff_is_exponential() {
        let provider = ClaudeProvider::new("k").unwrap();
        assert_eq!(provider.backoff(0), Duration::from_secs(1));
        assert_eq!(provider.backoff(1), Duration::from_secs(2));
        assert_eq!(provider.backoff(2), Duration::from_secs(4));
    }

    // ========== Response Extraction Tests ==========

    #[test]
    fn test_extract_message_text() {
        let body = json!({"content": [{"type": "text", "text": "  hello  "}]});
        assert_eq!(extract_message_text(&body).unwrap(), "hello");
    }

    #[test]
    fn test_extract_message_text_missing_content() {
        let body = json!({"id": "msg_1"});
        assert!(extract_message_text(&body).is_err());
    }

    #[test]
    fn test_extract_message_text_non_text_block() {
        let body = json!({"content": [{"type": "tool_use"}]});
        let err = extract_message_text(&body).unwrap_err();
        assert!(err.to_string().contains("non-text content"));
    }

    // ========== Empty Batch Tests ==========

    #[tokio::test]
    async fn test_empty_batch_short_circuits() {
        let provider = ClaudeProvider::new("k").unwrap();
        let request = BatchRequest {
            source_lang: "sv".to_string(),
            target_lang: "de".to_string(),
            items: Vec::new(),
            global_context: None,
            per_key_context: Default::default(),
        };
        let reply = provider.translate_batch(&request).await.unwrap();
        assert!(reply.response.translations.is_empty());
        assert_eq!(reply.response.target_language, "de");
    }

    // ========== Integration Tests (require a real API key) ==========

    fn real_request() -> BatchRequest {
        BatchRequest {
            source_lang: "sv".to_string(),
            target_lang: "en".to_string(),
            items: vec![crate::select::BatchItem {
                key: "greeting".to_string(),
                text: "Hej {{name}}".to_string(),
                signature: "{{name}}:1".to_string(),
            }],
            global_context: None,
            per_key_context: Default::default(),
        }
    }

    #[tokio::test]
    #[ignore] // Run with: cargo test -- --ignored
    async fn test_real_api_translates_batch() {
        if std::env::var("ANTHROPIC_API_KEY").is_err() {
            eprintln!("Skipping: ANTHROPIC_API_KEY not set");
            return;
        }

        let provider = ClaudeProvider::from_env().unwrap();
        let reply = provider.translate_batch(&real_request()).await.unwrap();
        assert_eq!(reply.response.translations.len(), 1);
        assert!(reply.response.translations[0].text.contains("{{name}}"));
    }

    #[tokio::test]
    #[ignore] // Run with: cargo test -- --ignored
    async fn test_real_api_invalid_key_is_auth_error() {
        let provider = ClaudeProvider::new("invalid-key-xyz").unwrap();
        let err = provider.translate_batch(&real_request()).await.unwrap_err();
        // 401 must surface as an auth error without consuming retries.
        assert!(matches!(err, TransmemError::Auth(_)));
    }
}
