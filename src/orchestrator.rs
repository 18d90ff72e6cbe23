//! The translate-validate-repair run driver
//!
//! Drives the provider over deterministic batches, applies the second
//! validation layer on every returned entry, and mutates memory records
//! in place on acceptance. Batches run strictly sequentially (provider
//! backoff state and record mutation are not designed for concurrent
//! access), and one batch's failure never aborts the run: everything
//! accumulates into [`RunStats`], except configuration and auth errors
//! which abort immediately.

use std::collections::HashMap;
use std::path::Path;

use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::journal::RunJournal;
use crate::memory::{self, MemoryRecord, TranslationStatus};
use crate::provider::{BatchRequest, TranslationProvider};
use crate::schema::validate_entry;
use crate::select::{batch_by_namespace, select_missing};

/// Statistics accumulated over one translation run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStats {
    pub batches_processed: u64,
    pub items_translated: u64,
    pub items_failed: u64,
    pub validation_errors: u64,
    pub repair_attempts: u64,
    pub updated_records: u64,
}

/// Translate every missing key of `target_lang`, mutating records in place
///
/// Per batch: build a request carrying the items, the optional global
/// context and any per-key metadata from the records; call the provider;
/// then re-validate each returned entry independently of whatever the
/// provider already checked: unknown keys are ignored, blank texts are
/// dropped, and a token-preservation or signature failure rejects only
/// that key. Accepted entries set the target value and flip the status
/// to ok.
///
/// # Errors
///
/// Only fatal configuration/auth errors propagate; every other failure
/// is counted and the run continues with the next batch.
pub async fn translate_missing(
    records: &mut [MemoryRecord],
    target_lang: &str,
    source_lang: &str,
    provider: &dyn TranslationProvider,
    batch_size: usize,
    global_context: Option<&str>,
    journal: Option<&RunJournal>,
) -> Result<RunStats> {
    let mut stats = RunStats::default();

    let missing = select_missing(records, target_lang);
    if missing.is_empty() {
        info!(target_lang, "no missing translations");
        return Ok(stats);
    }

    let batches = batch_by_namespace(missing, batch_size)?;
    info!(
        target_lang,
        provider = provider.name(),
        batches = batches.len(),
        "starting translation run"
    );

    let index_by_key: HashMap<String, usize> = records
        .iter()
        .enumerate()
        .map(|(index, record)| (record.key.clone(), index))
        .collect();

    for (batch_number, batch) in batches.into_iter().enumerate() {
        let batch_id = batch_number + 1;

        let mut per_key_context = std::collections::BTreeMap::new();
        for item in &batch {
            if let Some(&index) = index_by_key.get(&item.key) {
                if !records[index].meta.is_empty() {
                    per_key_context.insert(item.key.clone(), records[index].meta.clone());
                }
            }
        }

        let batch_len = batch.len() as u64;
        let request = BatchRequest {
            source_lang: source_lang.to_string(),
            target_lang: target_lang.to_string(),
            items: batch,
            global_context: global_context.map(str::to_string),
            per_key_context,
        };

        if let Some(journal) = journal {
            journal.log_request(batch_id, &request);
        }

        let reply = match provider.translate_batch(&request).await {
            Ok(reply) => reply,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                stats.items_failed += batch_len;
                warn!(batch_id, error = %e, "batch failed");
                if let Some(journal) = journal {
                    journal.log_failure(batch_id, "translation_error", &e.to_string(), json!({}));
                }
                continue;
            }
        };

        stats.repair_attempts += u64::from(reply.repair_attempts);
        if let Some(journal) = journal {
            journal.log_response(batch_id, &json!(reply.response));
        }
        if reply.response.target_language != target_lang {
            warn!(
                batch_id,
                reported = %reply.response.target_language,
                "provider reported unexpected target language"
            );
        }

        for entry in &reply.response.translations {
            let Some(&index) = index_by_key.get(&entry.key) else {
                debug!(key = %entry.key, "ignoring unknown key in response");
                continue;
            };
            if entry.text.trim().is_empty() {
                continue;
            }

            let record = &mut records[index];
            if let Err(message) = validate_entry(
                &record.source,
                &record.placeholder_signature,
                &entry.text,
                &entry.key,
            ) {
                stats.validation_errors += 1;
                warn!(batch_id, key = %entry.key, "{}", message);
                if let Some(journal) = journal {
                    journal.log_failure(
                        batch_id,
                        "placeholder_mismatch",
                        &message,
                        json!({"key": entry.key}),
                    );
                }
                continue;
            }

            record
                .targets
                .insert(target_lang.to_string(), json!(entry.text));
            record
                .status
                .insert(target_lang.to_string(), TranslationStatus::Ok);
            stats.items_translated += 1;
            stats.updated_records += 1;
        }

        stats.batches_processed += 1;
    }

    info!(
        translated = stats.items_translated,
        failed = stats.items_failed,
        invalid = stats.validation_errors,
        "translation run finished"
    );

    Ok(stats)
}

/// File-level wrapper: read the memory artifact, run, rewrite it wholesale
///
/// Every record, mutated or not, is rewritten in its original order,
/// which is what makes interrupted runs resumable by simply re-selecting
/// the remaining missing keys.
pub async fn translate_missing_file(
    memory_path: &Path,
    target_lang: &str,
    source_lang: &str,
    provider: &dyn TranslationProvider,
    batch_size: usize,
    global_context: Option<&str>,
    journal: Option<&RunJournal>,
) -> Result<(RunStats, Vec<MemoryRecord>)> {
    let mut records = memory::read_memory(memory_path)?;

    let stats = translate_missing(
        &mut records,
        target_lang,
        source_lang,
        provider,
        batch_size,
        global_context,
        journal,
    )
    .await?;

    memory::write_memory(memory_path, &records)?;

    Ok((stats, records))
}
