//! Translation provider abstraction
//!
//! The pipeline talks to LLM backends through the [`TranslationProvider`]
//! trait only; the provider is injected into the orchestrator as an
//! explicit dependency, never reached through ambient global state.
//!
//! Concrete backends:
//!
//! - [`ClaudeProvider`] - Anthropic Messages API, with an asynchronous
//!   batch-submission mode for large runs
//! - [`OpenAiProvider`] - OpenAI-compatible Chat Completions API
//! - [`MockProvider`] - deterministic, API-free backend for tests and
//!   offline runs
//!
//! Providers own transport retry/backoff, rate-limit handling and the
//! bounded translate/validate/repair protocol; the orchestrator applies
//! an independent second validation layer on top.

pub mod claude;
pub mod mock;
pub mod openai;
pub mod protocol;
pub mod util;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::select::BatchItem;

pub use claude::ClaudeProvider;
pub use mock::{MockMode, MockProvider};
pub use openai::OpenAiProvider;
pub use protocol::BatchState;

/// One batch of translation work handed to a provider
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchRequest {
    pub source_lang: String,
    pub target_lang: String,
    pub items: Vec<BatchItem>,
    /// Context applied to every item of the run
    pub global_context: Option<String>,
    /// Per-key prompt context pulled from record metadata
    pub per_key_context: BTreeMap<String, BTreeMap<String, String>>,
}

/// One proposed translation, provisional until validated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationEntry {
    pub key: String,
    pub text: String,
}

/// Schema-validated provider output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderResponse {
    #[serde(rename = "targetLanguage")]
    pub target_language: String,
    pub translations: Vec<TranslationEntry>,
}

impl ProviderResponse {
    /// An empty, well-formed response for a target language
    pub fn empty(target_lang: &str) -> Self {
        ProviderResponse {
            target_language: target_lang.to_string(),
            translations: Vec::new(),
        }
    }
}

/// A provider's answer for one batch, with protocol bookkeeping
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderReply {
    pub response: ProviderResponse,
    /// Repair round-trips spent producing this response
    pub repair_attempts: u32,
}

impl ProviderReply {
    pub fn clean(response: ProviderResponse) -> Self {
        ProviderReply {
            response,
            repair_attempts: 0,
        }
    }
}

/// Abstract contract every translation backend implements
///
/// `translate_batch` returns a schema-valid reply or raises on
/// unrecoverable failure. Implementations may retry transport errors
/// with backoff and run the repair sub-protocol internally, but must
/// never return malformed output.
#[async_trait]
pub trait TranslationProvider: Send + Sync {
    async fn translate_batch(&self, request: &BatchRequest) -> Result<ProviderReply>;

    /// Short name used in logs and journals
    fn name(&self) -> &str;
}
