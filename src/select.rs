//! Missing-key selection and deterministic batching
//!
//! Batches group keys by namespace so related strings share one LLM
//! context (terminology consistency), and everything is sorted so the
//! same missing set and batch size always produce the same batch
//! sequence, independent of prior traversal order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TransmemError};
use crate::memory::{MemoryRecord, TranslationStatus, extract_namespace};

/// One unit of translation work: a key, its source text and the
/// protected-token signature the translation must reproduce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItem {
    pub key: String,
    pub text: String,
    pub signature: String,
}

/// Collect the items still missing a translation for `target_lang`
pub fn select_missing(records: &[MemoryRecord], target_lang: &str) -> Vec<BatchItem> {
    records
        .iter()
        .filter(|record| record.status.get(target_lang) == Some(&TranslationStatus::Missing))
        .map(|record| BatchItem {
            key: record.key.clone(),
            text: record.source.clone(),
            signature: record.placeholder_signature.clone(),
        })
        .collect()
}

/// Group items into deterministic, namespace-local batches
///
/// Namespaces are emitted in lexicographic order, items are sorted by key
/// within each namespace, then chunked sequentially to `batch_size`.
///
/// # Errors
///
/// [`TransmemError::Config`] when `batch_size` is zero.
pub fn batch_by_namespace(
    items: Vec<BatchItem>,
    batch_size: usize,
) -> Result<Vec<Vec<BatchItem>>> {
    if batch_size == 0 {
        return Err(TransmemError::Config(
            "batch size must be at least 1".to_string(),
        ));
    }

    let mut by_namespace: BTreeMap<String, Vec<BatchItem>> = BTreeMap::new();
    for item in items {
        by_namespace
            .entry(extract_namespace(&item.key))
            .or_default()
            .push(item);
    }

    let mut batches = Vec::new();
    for (_, mut namespace_items) in by_namespace {
        namespace_items.sort_by(|a, b| a.key.cmp(&b.key));
        for chunk in namespace_items.chunks(batch_size) {
            batches.push(chunk.to_vec());
        }
    }

    Ok(batches)
}
