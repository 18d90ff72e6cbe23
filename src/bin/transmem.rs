//! Command-line interface for the translation memory pipeline

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::error;
use tracing_subscriber::EnvFilter;

use transmem::journal::RunJournal;
use transmem::provider::{
    ClaudeProvider, MockMode, MockProvider, OpenAiProvider, TranslationProvider,
};
use transmem::schema::{ResponseValidation, validate_response_text};
use transmem::{Result, TransmemError, catalog, memory, merge, orchestrator, report};

#[derive(Parser)]
#[command(
    name = "transmem",
    version,
    about = "LLM-backed translation memory for key/value i18n catalogs"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ProviderKind {
    Claude,
    Openai,
    Mock,
}

#[derive(Subcommand)]
enum Command {
    /// Build the memory artifact from catalog files
    BuildMemory {
        /// Directory containing per-language catalog JSON files
        #[arg(long, default_value = "i18n")]
        catalog_dir: PathBuf,
        /// Output memory artifact
        #[arg(long, default_value = "work/memory.jsonl")]
        output: PathBuf,
        /// Source language code
        #[arg(long, default_value = "sv")]
        source_lang: String,
    },

    /// Translate missing keys for a target language
    TranslateMissing {
        #[arg(long, default_value = "work/memory.jsonl")]
        memory_file: PathBuf,
        /// Target language code
        #[arg(long)]
        target_lang: String,
        #[arg(long, default_value = "sv")]
        source_lang: String,
        /// Translation backend
        #[arg(long, value_enum, default_value = "claude")]
        provider: ProviderKind,
        /// Model override for the chosen backend
        #[arg(long)]
        model: Option<String>,
        /// Maximum items per batch
        #[arg(long, default_value_t = 10)]
        batch_size: usize,
        /// Directory for run journals
        #[arg(long, default_value = "work/runs")]
        runs_dir: PathBuf,
        /// Global context applied to every translation
        #[arg(long)]
        context: Option<String>,
        /// File containing the global context
        #[arg(long, conflicts_with = "context")]
        context_file: Option<PathBuf>,
    },

    /// Merge translations from the memory artifact into a catalog
    WriteBack {
        #[arg(long, default_value = "work/memory.jsonl")]
        memory_file: PathBuf,
        #[arg(long, default_value = "i18n")]
        catalog_dir: PathBuf,
        #[arg(long)]
        target_lang: String,
        /// Overwrite existing non-empty translations
        #[arg(long)]
        force: bool,
    },

    /// Validate a provider response file against the expected schema
    Validate {
        /// Path to the response JSON file
        response_file: PathBuf,
    },

    /// End-to-end pipeline: build-memory, translate-missing, write-back
    Run {
        #[arg(long, default_value = "i18n")]
        catalog_dir: PathBuf,
        #[arg(long, default_value = "work/memory.jsonl")]
        memory_file: PathBuf,
        #[arg(long)]
        target_lang: String,
        #[arg(long, default_value = "sv")]
        source_lang: String,
        #[arg(long, value_enum, default_value = "claude")]
        provider: ProviderKind,
        #[arg(long)]
        model: Option<String>,
        #[arg(long, default_value_t = 10)]
        batch_size: usize,
        #[arg(long, default_value = "work/runs")]
        runs_dir: PathBuf,
        /// Overwrite existing non-empty translations when writing back
        #[arg(long)]
        force: bool,
        /// Skip the translation step (useful for testing write-back)
        #[arg(long)]
        skip_translate: bool,
        #[arg(long)]
        context: Option<String>,
        #[arg(long, conflicts_with = "context")]
        context_file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> Result<()> {
    match command {
        Command::BuildMemory {
            catalog_dir,
            output,
            source_lang,
        } => {
            let catalogs = catalog::read_catalog_dir(&catalog_dir)?;
            let records = memory::build_memory(&catalogs, &source_lang)?;
            memory::write_memory(&output, &records)?;
            println!("wrote {} records to {}", records.len(), output.display());
            Ok(())
        }

        Command::TranslateMissing {
            memory_file,
            target_lang,
            source_lang,
            provider,
            model,
            batch_size,
            runs_dir,
            context,
            context_file,
        } => {
            let provider = build_provider(provider, model.as_deref())?;
            let global_context = resolve_context(context, context_file.as_deref())?;
            let journal = RunJournal::create(&runs_dir)?;

            let (stats, records) = orchestrator::translate_missing_file(
                &memory_file,
                &target_lang,
                &source_lang,
                provider.as_ref(),
                batch_size,
                global_context.as_deref(),
                Some(&journal),
            )
            .await?;

            journal.finalize(&target_lang, &stats);
            print!("{}", report::summarize(&records, &target_lang, &stats).render());
            Ok(())
        }

        Command::WriteBack {
            memory_file,
            catalog_dir,
            target_lang,
            force,
        } => {
            let records = memory::read_memory(&memory_file)?;
            let catalog_path = catalog_dir.join(format!("{}.json", target_lang));
            let stats = merge::merge_into_catalog(&records, &target_lang, &catalog_path, force)?;
            println!(
                "merged into {}: {} updated, {} skipped",
                catalog_path.display(),
                stats.updated,
                stats.skipped
            );
            Ok(())
        }

        Command::Validate { response_file } => {
            let text = fs::read_to_string(&response_file)?;
            match validate_response_text(&text) {
                ResponseValidation::WellFormed(response) => {
                    println!(
                        "valid: {} translations for '{}'",
                        response.translations.len(),
                        response.target_language
                    );
                    Ok(())
                }
                ResponseValidation::Malformed(reason) => {
                    Err(TransmemError::MalformedOutput(reason))
                }
            }
        }

        Command::Run {
            catalog_dir,
            memory_file,
            target_lang,
            source_lang,
            provider,
            model,
            batch_size,
            runs_dir,
            force,
            skip_translate,
            context,
            context_file,
        } => {
            let catalogs = catalog::read_catalog_dir(&catalog_dir)?;
            let records = memory::build_memory(&catalogs, &source_lang)?;
            memory::write_memory(&memory_file, &records)?;
            println!("memory: {} records", records.len());

            let records = if skip_translate {
                records
            } else {
                let provider = build_provider(provider, model.as_deref())?;
                let global_context = resolve_context(context, context_file.as_deref())?;
                let journal = RunJournal::create(&runs_dir)?;

                let (stats, records) = orchestrator::translate_missing_file(
                    &memory_file,
                    &target_lang,
                    &source_lang,
                    provider.as_ref(),
                    batch_size,
                    global_context.as_deref(),
                    Some(&journal),
                )
                .await?;

                journal.finalize(&target_lang, &stats);
                print!("{}", report::summarize(&records, &target_lang, &stats).render());
                records
            };

            let catalog_path = catalog_dir.join(format!("{}.json", target_lang));
            let stats = merge::merge_into_catalog(&records, &target_lang, &catalog_path, force)?;
            println!(
                "write-back: {} updated, {} skipped",
                stats.updated, stats.skipped
            );
            Ok(())
        }
    }
}

fn build_provider(
    kind: ProviderKind,
    model: Option<&str>,
) -> Result<Box<dyn TranslationProvider>> {
    match kind {
        ProviderKind::Claude => {
            let mut provider = ClaudeProvider::from_env()?;
            if let Some(model) = model {
                provider = provider.with_model(model);
            }
            Ok(Box::new(provider))
        }
        ProviderKind::Openai => {
            let mut provider = OpenAiProvider::from_env()?;
            if let Some(model) = model {
                provider = provider.with_model(model);
            }
            Ok(Box::new(provider))
        }
        ProviderKind::Mock => Ok(Box::new(MockProvider::new(MockMode::Suffix))),
    }
}

fn resolve_context(
    context: Option<String>,
    context_file: Option<&Path>,
) -> Result<Option<String>> {
    match (context, context_file) {
        (Some(context), _) => Ok(Some(context)),
        (None, Some(path)) => {
            let content = fs::read_to_string(path).map_err(|e| {
                TransmemError::Config(format!(
                    "cannot read context file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
            Ok(Some(content.trim().to_string()))
        }
        (None, None) => Ok(None),
    }
}
