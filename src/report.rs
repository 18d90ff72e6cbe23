//! End-of-run summary reporting

use serde::Serialize;

use crate::memory::{MemoryRecord, TranslationStatus};
use crate::orchestrator::RunStats;

/// Summary of one translation run against the post-run memory state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub target_language: String,
    pub missing_before: u64,
    pub missing_after: u64,
    pub translated: u64,
    pub failed: u64,
    pub invalid: u64,
    pub needs_review: u64,
    pub batches_processed: u64,
    pub repair_attempts: u64,
}

/// Build the run report from post-run records and run statistics
///
/// Records with no status entry for the target language count as
/// missing. `missing_before` is reconstructed as the post-run missing
/// count plus everything translated this run.
pub fn summarize(records: &[MemoryRecord], target_lang: &str, stats: &RunStats) -> RunReport {
    let mut missing_after = 0;
    let mut invalid = 0;
    let mut needs_review = 0;

    for record in records {
        match record
            .status
            .get(target_lang)
            .copied()
            .unwrap_or(TranslationStatus::Missing)
        {
            TranslationStatus::Missing => missing_after += 1,
            TranslationStatus::Invalid => invalid += 1,
            TranslationStatus::NeedsReview => needs_review += 1,
            TranslationStatus::Ok => {}
        }
    }

    RunReport {
        target_language: target_lang.to_string(),
        missing_before: missing_after + stats.items_translated,
        missing_after,
        translated: stats.items_translated,
        failed: stats.items_failed,
        invalid: stats.validation_errors + invalid,
        needs_review,
        batches_processed: stats.batches_processed,
        repair_attempts: stats.repair_attempts,
    }
}

impl RunReport {
    /// Render the banner printed at the end of a run
    pub fn render(&self) -> String {
        let rule = "=".repeat(60);
        format!(
            "\n{rule}\n\
            Translation Summary: {target}\n\
            {rule}\n\
            Missing before:  {missing_before}\n\
            Missing after:   {missing_after}\n\
            Translated:      {translated}\n\
            Failed:          {failed}\n\
            Invalid:         {invalid}\n\
            Needs review:    {needs_review}\n\
            Batches:         {batches}\n\
            Repair attempts: {repairs}\n\
            {rule}\n",
            rule = rule,
            target = self.target_language,
            missing_before = self.missing_before,
            missing_after = self.missing_after,
            translated = self.translated,
            failed = self.failed,
            invalid = self.invalid,
            needs_review = self.needs_review,
            batches = self.batches_processed,
            repairs = self.repair_attempts,
        )
    }
}
