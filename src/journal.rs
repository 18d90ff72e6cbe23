//! Per-run request/response/failure journals
//!
//! Every run gets its own directory under the runs root with three
//! append-only JSONL journals plus a summary written at the end. The
//! journal is observability, not state: a write failure is logged and
//! swallowed, it never aborts a run.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::{Value, json};
use tracing::warn;

use crate::error::Result;
use crate::orchestrator::RunStats;
use crate::provider::BatchRequest;

/// Append-only journal for one translation run
#[derive(Debug)]
pub struct RunJournal {
    run_id: String,
    run_dir: PathBuf,
}

impl RunJournal {
    /// Create `runs_dir/<run-id>/` and an empty journal
    ///
    /// The run id is the UTC creation time, millisecond precision, so
    /// directory listings sort chronologically.
    pub fn create(runs_dir: &Path) -> Result<Self> {
        let run_id = Utc::now().format("%Y%m%dT%H%M%S%3fZ").to_string();
        let run_dir = runs_dir.join(&run_id);
        fs::create_dir_all(&run_dir)?;

        Ok(RunJournal { run_id, run_dir })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Record a batch request before it is sent
    pub fn log_request(&self, batch_id: usize, request: &BatchRequest) {
        self.append(
            "requests.jsonl",
            json!({
                "batch_id": batch_id,
                "timestamp": timestamp(),
                "source_lang": request.source_lang,
                "target_lang": request.target_lang,
                "items": request.items,
                "item_count": request.items.len(),
            }),
        );
    }

    /// Record a provider response
    pub fn log_response(&self, batch_id: usize, response: &Value) {
        self.append(
            "responses.jsonl",
            json!({
                "batch_id": batch_id,
                "timestamp": timestamp(),
                "success": true,
                "response": response,
            }),
        );
    }

    /// Record a batch- or key-level failure
    pub fn log_failure(&self, batch_id: usize, error_type: &str, message: &str, context: Value) {
        self.append(
            "failures.jsonl",
            json!({
                "batch_id": batch_id,
                "timestamp": timestamp(),
                "error_type": error_type,
                "error_message": message,
                "context": context,
            }),
        );
    }

    /// Write the run summary; call once, after the last batch
    pub fn finalize(&self, target_lang: &str, stats: &RunStats) {
        let summary = json!({
            "run_id": self.run_id,
            "completed_at": timestamp(),
            "target_language": target_lang,
            "batches_processed": stats.batches_processed,
            "items_translated": stats.items_translated,
            "items_failed": stats.items_failed,
            "validation_errors": stats.validation_errors,
            "repair_attempts": stats.repair_attempts,
        });

        let path = self.run_dir.join("summary.json");
        let rendered = match serde_json::to_string_pretty(&summary) {
            Ok(rendered) => rendered,
            Err(e) => {
                warn!(error = %e, "could not serialize run summary");
                return;
            }
        };
        if let Err(e) = fs::write(&path, rendered + "\n") {
            warn!(path = %path.display(), error = %e, "could not write run summary");
        }
    }

    fn append(&self, file_name: &str, record: Value) {
        let path = self.run_dir.join(file_name);
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut file| writeln!(file, "{}", record));

        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "journal write failed");
        }
    }
}

fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}
