//! Strict validation of provider output against the response schema
//!
//! Raw LLM output is parsed into a tagged structure before any field is
//! read: [`ResponseValidation::WellFormed`] carries a typed
//! [`ProviderResponse`], [`ResponseValidation::Malformed`] carries the
//! reason. Deviations are never silently coerced.

use serde_json::Value;

use crate::provider::{ProviderResponse, TranslationEntry};
use crate::tokens;

/// Outcome of validating raw provider output
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseValidation {
    WellFormed(ProviderResponse),
    Malformed(String),
}

impl ResponseValidation {
    pub fn is_well_formed(&self) -> bool {
        matches!(self, ResponseValidation::WellFormed(_))
    }
}

/// Validate raw response text against the expected schema
///
/// Checks, in order: parseable JSON; top-level object; `targetLanguage`
/// present and a string; `translations` present and an array; every
/// entry an object with string `key` and `text`; `text` non-blank.
/// The first failure wins and its reason names the offending field.
pub fn validate_response_text(text: &str) -> ResponseValidation {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            return ResponseValidation::Malformed(format!("output is not parseable JSON: {}", e));
        }
    };

    validate_response_value(&value)
}

/// Validate an already-parsed JSON value against the expected schema
pub fn validate_response_value(value: &Value) -> ResponseValidation {
    let Some(object) = value.as_object() else {
        return ResponseValidation::Malformed("output must be a JSON object".to_string());
    };

    let Some(target_language) = object.get("targetLanguage") else {
        return ResponseValidation::Malformed("missing required field: targetLanguage".to_string());
    };
    let Some(target_language) = target_language.as_str() else {
        return ResponseValidation::Malformed("targetLanguage must be a string".to_string());
    };

    let Some(translations) = object.get("translations") else {
        return ResponseValidation::Malformed("missing required field: translations".to_string());
    };
    let Some(translations) = translations.as_array() else {
        return ResponseValidation::Malformed("translations must be an array".to_string());
    };

    let mut entries = Vec::with_capacity(translations.len());
    for (index, entry) in translations.iter().enumerate() {
        let Some(entry) = entry.as_object() else {
            return ResponseValidation::Malformed(format!(
                "translations[{}] must be an object",
                index
            ));
        };

        let Some(key) = entry.get("key") else {
            return ResponseValidation::Malformed(format!(
                "translations[{}] missing required field: key",
                index
            ));
        };
        let Some(key) = key.as_str() else {
            return ResponseValidation::Malformed(format!(
                "translations[{}].key must be a string",
                index
            ));
        };

        let Some(text) = entry.get("text") else {
            return ResponseValidation::Malformed(format!(
                "translations[{}] missing required field: text",
                index
            ));
        };
        let Some(text) = text.as_str() else {
            return ResponseValidation::Malformed(format!(
                "translations[{}].text must be a string",
                index
            ));
        };

        if text.trim().is_empty() {
            return ResponseValidation::Malformed(format!(
                "translations[{}].text cannot be empty",
                index
            ));
        }

        entries.push(TranslationEntry {
            key: key.to_string(),
            text: text.to_string(),
        });
    }

    ResponseValidation::WellFormed(ProviderResponse {
        target_language: target_language.to_string(),
        translations: entries,
    })
}

/// Validate one translated entry against its source
///
/// The candidate must preserve the exact protected-token multiset of the
/// source, and its recomputed signature must equal the stored source
/// signature. The error string names missing and extra tokens with their
/// counts, or the signature pair.
pub fn validate_entry(
    source: &str,
    source_signature: &str,
    candidate: &str,
    key: &str,
) -> std::result::Result<(), String> {
    let check = tokens::validate(source, candidate);
    if !check.valid {
        let mut parts = Vec::new();
        if !check.diff.missing.is_empty() {
            parts.push(format!("missing tokens: {}", render_counts(&check.diff.missing)));
        }
        if !check.diff.extra.is_empty() {
            parts.push(format!("extra tokens: {}", render_counts(&check.diff.extra)));
        }
        return Err(format!(
            "protected token mismatch for key '{}': {}",
            key,
            parts.join("; ")
        ));
    }

    let candidate_signature = tokens::signature(candidate);
    if candidate_signature != source_signature {
        return Err(format!(
            "placeholder signature mismatch for key '{}': expected '{}', got '{}'",
            key, source_signature, candidate_signature
        ));
    }

    Ok(())
}

fn render_counts(counts: &tokens::TokenCounts) -> String {
    counts
        .iter()
        .map(|(token, count)| format!("{}:{}", token, count))
        .collect::<Vec<_>>()
        .join(", ")
}
