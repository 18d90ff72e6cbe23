//! Mock translation provider for testing
//!
//! Deterministic, API-free backend for exercising the pipeline without
//! keys or network access. Each mode simulates a different backend
//! behavior, including failure and malformed-output paths.
//!
//! # Example
//!
//! ```ignore
//! use transmem::provider::{MockMode, MockProvider, TranslationProvider};
//!
//! let mock = MockProvider::new(MockMode::Suffix);
//! let reply = mock.translate_batch(&request).await?;
//! ```

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::{Result, TransmemError};
use crate::provider::{
    BatchRequest, ProviderReply, ProviderResponse, TranslationEntry, TranslationProvider,
};
use crate::schema::{ResponseValidation, validate_response_text};

/// Mock translation modes for different test scenarios
#[derive(Debug, Clone)]
pub enum MockMode {
    /// Return the source text unchanged; preserves every protected token
    Echo,

    /// Append `_<target>` to each text: "hello" → "hello_de"
    Suffix,

    /// Predefined (text, target_lang) → translation lookup, falling back
    /// to suffix behavior for unknown pairs
    Mappings(HashMap<(String, String), String>),

    /// Always fail with a transport error
    Error(String),

    /// Return this raw payload, validated like real provider output.
    /// Useful for driving the malformed-output path end to end.
    Raw(String),
}

/// Deterministic provider that simulates translation backends
#[derive(Debug, Clone)]
pub struct MockProvider {
    mode: MockMode,
}

impl MockProvider {
    pub fn new(mode: MockMode) -> Self {
        MockProvider { mode }
    }

    fn translate_text(&self, text: &str, target_lang: &str) -> String {
        match &self.mode {
            MockMode::Echo => text.to_string(),
            MockMode::Suffix => format!("{}_{}", text, target_lang),
            MockMode::Mappings(map) => map
                .get(&(text.to_string(), target_lang.to_string()))
                .cloned()
                .unwrap_or_else(|| format!("{}_{}", text, target_lang)),
            // Error and Raw are handled before per-text translation.
            MockMode::Error(_) | MockMode::Raw(_) => text.to_string(),
        }
    }
}

#[async_trait]
impl TranslationProvider for MockProvider {
    async fn translate_batch(&self, request: &BatchRequest) -> Result<ProviderReply> {
        match &self.mode {
            MockMode::Error(message) => {
                return Err(TransmemError::Transport(message.clone()));
            }
            MockMode::Raw(payload) => {
                return match validate_response_text(payload) {
                    ResponseValidation::WellFormed(response) => Ok(ProviderReply::clean(response)),
                    ResponseValidation::Malformed(reason) => {
                        Err(TransmemError::MalformedOutput(reason))
                    }
                };
            }
            _ => {}
        }

        let translations = request
            .items
            .iter()
            .map(|item| TranslationEntry {
                key: item.key.clone(),
                text: self.translate_text(&item.text, &request.target_lang),
            })
            .collect();

        Ok(ProviderReply::clean(ProviderResponse {
            target_language: request.target_lang.clone(),
            translations,
        }))
    }

    fn name(&self) -> &str {
        "mock"
    }
}
