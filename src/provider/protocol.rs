//! The translate/validate/repair protocol shared by chat-based providers
//!
//! Each batch is driven through an explicit state machine:
//!
//! ```text
//! Drafting → AwaitingProvider → Validating → {Accepted | Repairing | Failed}
//! Repairing → Drafting   (with a repair prompt, at most MAX_REPAIR_ATTEMPTS times)
//! ```
//!
//! A provider only needs to supply one raw completion per prompt (the
//! [`Completion`] trait); drafting, first-pass JSON repair, schema
//! validation and the bounded re-prompt loop live here so every backend
//! behaves identically.

use async_trait::async_trait;

use crate::error::{Result, TransmemError};
use crate::prompts::{build_repair_prompt, build_translation_prompt};
use crate::provider::util::{extract_json_from_response, fix_token_escaping};
use crate::provider::{BatchRequest, ProviderReply};
use crate::schema::{ResponseValidation, validate_response_text};

/// Extra prompt round-trips allowed after the initial attempt.
pub const MAX_REPAIR_ATTEMPTS: u32 = 2;

/// States of the per-batch protocol machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    /// A prompt (initial or repair) is ready to send
    Drafting,
    /// Waiting on the raw completion
    AwaitingProvider,
    /// Raw output is being checked against the response schema
    Validating,
    /// A repair prompt is being prepared
    Repairing,
    /// Terminal: a schema-valid response was produced
    Accepted,
    /// Terminal: repair attempts are exhausted
    Failed,
}

impl BatchState {
    pub fn is_terminal(self) -> bool {
        matches!(self, BatchState::Accepted | BatchState::Failed)
    }
}

/// One raw LLM completion; implemented by each chat-based backend.
///
/// Implementations handle their own transport retries and backoff; a
/// returned error is treated as final for that prompt.
#[async_trait]
pub trait Completion: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Drive one batch through the protocol until a terminal state
///
/// Completion errors consume a repair attempt like malformed output does,
/// except fatal (configuration/auth) errors which surface immediately.
/// Exhausting the allowed attempts yields the last error.
pub async fn drive_batch(
    completer: &dyn Completion,
    request: &BatchRequest,
) -> Result<ProviderReply> {
    let mut prompt = build_translation_prompt(request);
    let mut state = BatchState::Drafting;
    let mut repair_attempts = 0u32;
    let mut raw_output = String::new();
    let mut last_failure: Option<TransmemError> = None;

    loop {
        state = match state {
            BatchState::Drafting => BatchState::AwaitingProvider,

            BatchState::AwaitingProvider => match completer.complete(&prompt).await {
                Ok(output) => {
                    raw_output = output;
                    BatchState::Validating
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    raw_output.clear();
                    last_failure = Some(e);
                    if repair_attempts < MAX_REPAIR_ATTEMPTS {
                        BatchState::Repairing
                    } else {
                        BatchState::Failed
                    }
                }
            },

            BatchState::Validating => {
                let candidate = fix_token_escaping(&extract_json_from_response(&raw_output));
                match validate_response_text(&candidate) {
                    ResponseValidation::WellFormed(response) => {
                        return Ok(ProviderReply {
                            response,
                            repair_attempts,
                        });
                    }
                    ResponseValidation::Malformed(reason) => {
                        raw_output = candidate;
                        last_failure = Some(TransmemError::MalformedOutput(reason));
                        if repair_attempts < MAX_REPAIR_ATTEMPTS {
                            BatchState::Repairing
                        } else {
                            BatchState::Failed
                        }
                    }
                }
            }

            BatchState::Repairing => {
                repair_attempts += 1;
                let reason = last_failure
                    .as_ref()
                    .map(|e| e.to_string())
                    .unwrap_or_default();
                prompt = build_repair_prompt(&raw_output, &prompt, &reason);
                BatchState::Drafting
            }

            BatchState::Failed => {
                return Err(last_failure.unwrap_or_else(|| {
                    TransmemError::MalformedOutput(
                        "translation failed: max repairs exceeded".to_string(),
                    )
                }));
            }

            // Accepted returns out of Validating directly.
            BatchState::Accepted => unreachable!("accepted state returns early"),
        };
    }
}
