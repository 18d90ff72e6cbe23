//! The translation memory: fingerprinted records and their persistence
//!
//! The memory artifact is the durable store mediating between catalogs
//! and translation runs: line-delimited JSON, UTF-8, one record per line,
//! rebuilt wholesale from a full catalog scan and rewritten wholesale
//! after every run so interrupted runs resume cleanly.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::catalog::CatalogSet;
use crate::error::{Result, TransmemError};
use crate::tokens;

/// Version string mixed into every fingerprint. Bump when the prompt
/// context or token grammar changes in a way that invalidates stored
/// fingerprints.
pub const CONTEXT_VERSION: &str = "1.0";

/// Namespace assigned to keys without a dot segment.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Per-language translation state of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationStatus {
    Ok,
    Missing,
    Invalid,
    NeedsReview,
}

/// One key of the translation memory
///
/// Field names are the wire names of the persisted JSONL artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Dotted hierarchical id, unique within the memory
    pub key: String,
    /// Substring before the first dot, or "default"
    pub ns: String,
    /// Language the source text is written in
    pub source_lang: String,
    /// Source text, already coerced to a string
    pub source: String,
    /// Per-language translation values; null when absent
    pub targets: BTreeMap<String, Value>,
    /// Per-language translation state
    pub status: BTreeMap<String, TranslationStatus>,
    /// Canonical protected-token signature of the source
    pub placeholder_signature: String,
    /// Free-form per-key prompt context (description, tone, ...)
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
    /// SHA-256 of key|source|signature|context-version, hex encoded.
    /// Stored for stale-source detection; nothing consults it yet.
    pub fingerprint: String,
}

/// Extract the namespace of a translation key
///
/// The namespace is the part before the first dot, or
/// [`DEFAULT_NAMESPACE`] when the key has none.
pub fn extract_namespace(key: &str) -> String {
    match key.split_once('.') {
        Some((ns, _)) => ns.to_string(),
        None => DEFAULT_NAMESPACE.to_string(),
    }
}

/// Whether a translation value counts as missing
///
/// Missing: null, a blank-after-trim string, or an empty mapping.
/// Everything else (including `0` and `false`) is present.
pub fn is_missing(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Compute the stable fingerprint of a translation entry
///
/// A pure function of (key, source, signature, context version): it
/// changes iff the source text or its protected-token structure changes.
pub fn compute_fingerprint(key: &str, source: &str, placeholder_signature: &str) -> String {
    let content = format!(
        "{}|{}|{}|{}",
        key, source, placeholder_signature, CONTEXT_VERSION
    );
    let digest = Sha256::digest(content.as_bytes());
    format!("{:x}", digest)
}

/// Coerce a raw catalog value into source text
///
/// Strings pass through, null becomes empty, everything else is
/// stringified via its JSON rendering.
fn coerce_source_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Build memory records from a full catalog scan
///
/// The key set is exactly the keys present in the source language:
/// source is authoritative, keys known only to other languages are
/// dropped. Keys are processed in sorted order so the record list is
/// deterministic.
///
/// # Errors
///
/// [`TransmemError::Config`] if `source_lang` has no catalog.
pub fn build_memory(catalogs: &CatalogSet, source_lang: &str) -> Result<Vec<MemoryRecord>> {
    let source_catalog = catalogs.get(source_lang).ok_or_else(|| {
        TransmemError::Config(format!(
            "source language '{}' not found among catalogs",
            source_lang
        ))
    })?;

    let mut keys: Vec<&String> = source_catalog.keys().collect();
    keys.sort();

    let mut records = Vec::with_capacity(keys.len());

    for key in keys {
        let source_text = source_catalog
            .get(key.as_str())
            .map(coerce_source_text)
            .unwrap_or_default();
        let placeholder_signature = tokens::signature(&source_text);
        let fingerprint = compute_fingerprint(key, &source_text, &placeholder_signature);

        let mut targets = BTreeMap::new();
        let mut status = BTreeMap::new();

        for (lang, catalog) in catalogs {
            if lang == source_lang {
                continue;
            }

            let value = catalog.get(key.as_str()).cloned().unwrap_or(Value::Null);
            let state = if is_missing(&value) {
                TranslationStatus::Missing
            } else {
                TranslationStatus::Ok
            };
            targets.insert(lang.clone(), value);
            status.insert(lang.clone(), state);
        }

        records.push(MemoryRecord {
            key: key.clone(),
            ns: extract_namespace(key),
            source_lang: source_lang.to_string(),
            source: source_text,
            targets,
            status,
            placeholder_signature,
            meta: BTreeMap::new(),
            fingerprint,
        });
    }

    Ok(records)
}

/// Write the memory artifact, replacing any previous content
///
/// One JSON object per line, UTF-8, non-ASCII unescaped, records in the
/// given order. The write is a full rewrite, never an append.
pub fn write_memory(path: &Path, records: &[MemoryRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut buffer = String::new();
    for record in records {
        buffer.push_str(&serde_json::to_string(record)?);
        buffer.push('\n');
    }

    fs::write(path, buffer)?;
    Ok(())
}

/// Read all records from a memory artifact
///
/// A missing file yields an empty list; blank lines are skipped.
pub fn read_memory(path: &Path) -> Result<Vec<MemoryRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(path)?;
    let mut records = Vec::new();
    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        records.push(serde_json::from_str(line)?);
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::FlatCatalog;
    use serde_json::json;

    fn catalog(pairs: &[(&str, Value)]) -> FlatCatalog {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect()
    }

    fn two_lang_set() -> CatalogSet {
        let mut catalogs = CatalogSet::new();
        catalogs.insert(
            "sv".to_string(),
            catalog(&[
                ("booking.confirm", json!("Bekräfta bokning")),
                ("greeting", json!("Hej {{name}}")),
            ]),
        );
        catalogs.insert(
            "en".to_string(),
            catalog(&[("booking.confirm", json!("Confirm booking")), ("greeting", json!(null))]),
        );
        catalogs
    }

    // ========== Predicate Tests ==========

    #[test]
    fn test_is_missing_null_blank_empty_map() {
        assert!(is_missing(&Value::Null));
        assert!(is_missing(&json!("")));
        assert!(is_missing(&json!("   ")));
        assert!(is_missing(&json!({})));
    }

    #[test]
    fn test_is_missing_false_for_falsy_values() {
        assert!(!is_missing(&json!(0)));
        assert!(!is_missing(&json!(false)));
        assert!(!is_missing(&json!("text")));
        assert!(!is_missing(&json!({"a": 1})));
    }

    #[test]
    fn test_extract_namespace() {
        assert_eq!(extract_namespace("booking.confirm"), "booking");
        assert_eq!(extract_namespace("a.b.c"), "a");
        assert_eq!(extract_namespace("welcome"), "default");
    }

    // ========== Fingerprint Tests ==========

    #[test]
    fn test_fingerprint_is_stable() {
        let a = compute_fingerprint("k", "text {{x}}", "{{x}}:1");
        let b = compute_fingerprint("k", "text {{x}}", "{{x}}:1");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_fingerprint_changes_with_source_or_signature() {
        let base = compute_fingerprint("k", "text", "");
        assert_ne!(base, compute_fingerprint("k", "other", ""));
        assert_ne!(base, compute_fingerprint("k", "text", "{{x}}:1"));
        assert_ne!(base, compute_fingerprint("k2", "text", ""));
    }

    // ========== Builder Tests ==========

    #[test]
    fn test_build_memory_unknown_source_lang() {
        let catalogs = two_lang_set();
        let result = build_memory(&catalogs, "fi");
        assert!(matches!(result, Err(TransmemError::Config(_))));
    }

    #[test]
    fn test_build_memory_sorted_and_statused() {
        let catalogs = two_lang_set();
        let records = build_memory(&catalogs, "sv").unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].key, "booking.confirm");
        assert_eq!(records[0].ns, "booking");
        assert_eq!(records[0].status["en"], TranslationStatus::Ok);

        assert_eq!(records[1].key, "greeting");
        assert_eq!(records[1].ns, "default");
        assert_eq!(records[1].status["en"], TranslationStatus::Missing);
        assert_eq!(records[1].placeholder_signature, "{{name}}:1");
    }

    #[test]
    fn test_build_memory_source_is_authoritative() {
        let mut catalogs = two_lang_set();
        catalogs
            .get_mut("en")
            .unwrap()
            .insert("orphan.key".to_string(), json!("English only"));

        let records = build_memory(&catalogs, "sv").unwrap();
        assert!(records.iter().all(|r| r.key != "orphan.key"));
    }

    #[test]
    fn test_build_memory_coerces_non_string_sources() {
        let mut catalogs = CatalogSet::new();
        catalogs.insert(
            "sv".to_string(),
            catalog(&[("count", json!(3)), ("empty", json!(null))]),
        );
        catalogs.insert("en".to_string(), catalog(&[]));

        let records = build_memory(&catalogs, "sv").unwrap();
        assert_eq!(records[0].source, "3");
        assert_eq!(records[1].source, "");
    }

    // ========== Persistence Tests ==========

    #[test]
    fn test_memory_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("work/memory.jsonl");

        let catalogs = two_lang_set();
        let records = build_memory(&catalogs, "sv").unwrap();
        write_memory(&path, &records).unwrap();

        let loaded = read_memory(&path).unwrap();
        assert_eq!(loaded, records);

        // One record per line, non-ASCII unescaped.
        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(raw.lines().count(), 2);
        assert!(raw.contains("Bekräfta"));
        assert!(!raw.contains("\\u00e4"));
    }

    #[test]
    fn test_read_memory_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let records = read_memory(&dir.path().join("absent.jsonl")).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_write_memory_is_full_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.jsonl");

        let catalogs = two_lang_set();
        let records = build_memory(&catalogs, "sv").unwrap();
        write_memory(&path, &records).unwrap();
        write_memory(&path, &records[..1].to_vec()).unwrap();

        assert_eq!(read_memory(&path).unwrap().len(), 1);
    }

    #[test]
    fn test_status_serializes_with_wire_names() {
        let serialized = serde_json::to_string(&TranslationStatus::NeedsReview).unwrap();
        assert_eq!(serialized, "\"needs_review\"");
        let serialized = serde_json::to_string(&TranslationStatus::Ok).unwrap();
        assert_eq!(serialized, "\"ok\"");
    }
}
