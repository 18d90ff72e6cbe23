//! Incremental LLM-backed translation memory for key/value catalogs
//!
//! `transmem` machine-translates structured key/value text catalogs
//! across target languages through a pluggable LLM backend, guaranteeing
//! that embedded non-translatable tokens (`{{variable}}` interpolations,
//! `\1` positional references) are never corrupted.
//!
//! # Pipeline
//!
//! 1. **Memory builder** - scans source + target catalogs into a
//!    persisted set of fingerprinted records with per-language status.
//! 2. **Selector/batcher** - picks records missing a target language and
//!    groups them into deterministic, namespace-local batches.
//! 3. **Orchestrator** - drives the provider batch by batch through a
//!    translate/validate/repair protocol, mutating records on acceptance.
//! 4. **Merge** - applies validated values into the target catalog under
//!    a non-destructive conflict policy.
//!
//! # Example
//!
//! ```ignore
//! use transmem::{catalog, memory, merge, orchestrator};
//! use transmem::provider::{MockMode, MockProvider};
//!
//! #[tokio::main]
//! async fn main() -> transmem::Result<()> {
//!     let catalogs = catalog::read_catalog_dir("i18n".as_ref())?;
//!     let records = memory::build_memory(&catalogs, "sv")?;
//!     memory::write_memory("work/memory.jsonl".as_ref(), &records)?;
//!
//!     let provider = MockProvider::new(MockMode::Suffix);
//!     let (stats, records) = orchestrator::translate_missing_file(
//!         "work/memory.jsonl".as_ref(), "en", "sv", &provider, 10, None, None,
//!     ).await?;
//!     println!("translated {} keys", stats.items_translated);
//!
//!     merge::merge_into_catalog(&records, "en", "i18n/en.json".as_ref(), false)?;
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod error;
pub mod journal;
pub mod memory;
pub mod merge;
pub mod orchestrator;
pub mod prompts;
pub mod provider;
pub mod report;
pub mod schema;
pub mod select;
pub mod tokens;

pub use error::{Result, TransmemError};
pub use memory::{MemoryRecord, TranslationStatus};
pub use orchestrator::RunStats;
pub use provider::{
    BatchRequest, ClaudeProvider, MockMode, MockProvider, OpenAiProvider, ProviderReply,
    ProviderResponse, TranslationEntry, TranslationProvider,
};
pub use select::BatchItem;
