use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use persona_corpus_core::validation::METADATA_FILE;
use persona_corpus_core::{
    build_repository_statistics, process_articles, process_records, read_json, run_extraction,
    validate_directory, write_json_atomic, ChunkingOptions, DatasetMetadata, ExtractionOptions,
    FilterField, PersonaProfile, ProcessingSummary, RecordFilter, SegmentationStrategy,
    ValidationOptions, STATISTICS_FILE,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "persona-corpus", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Stream the writings corpus and keep the records matching a filter.
    Extract {
        /// Source XML corpus.
        #[arg(long, env = "PERSONA_CORPUS_SOURCE")]
        source: PathBuf,
        /// Directory that receives raw_records.json and record_statistics.json.
        #[arg(long, env = "PERSONA_CORPUS_RAW_DIR")]
        output: PathBuf,
        /// Record attribute to filter on: author, author-id, dynasty or record-id.
        #[arg(long, default_value = "author")]
        filter_field: String,
        /// Value the attribute must equal.
        #[arg(long, default_value = "杜甫")]
        filter_value: String,
        /// Log progress every N scanned records; 0 disables it.
        #[arg(long, default_value_t = 100_000)]
        progress_every: u64,
    },
    /// Map and segment raw input into structured documents and training chunks.
    Process {
        /// Built-in persona id, e.g. du_fu or elon_musk.
        #[arg(long, env = "PERSONA_CORPUS_PERSONA")]
        persona: String,
        /// raw_records.json for poets, the raw article directory otherwise.
        #[arg(long)]
        input: PathBuf,
        /// Directory that receives the processed artifacts.
        #[arg(long)]
        output: PathBuf,
        /// Window size in words for fixed-window segmentation.
        #[arg(long, env = "PERSONA_CORPUS_WINDOW_WORDS", default_value_t = 500)]
        window_words: usize,
        /// Overlap in words between consecutive windows.
        #[arg(long, env = "PERSONA_CORPUS_OVERLAP_WORDS", default_value_t = 100)]
        overlap_words: usize,
        /// Annotations rendered per document and per annotation chunk.
        #[arg(long, default_value_t = 5)]
        annotation_limit: usize,
    },
    /// Check a processed dataset directory and write validation_report.json.
    Validate {
        dataset_name: String,
        dir: PathBuf,
        /// Persona whose size bounds apply; read from dataset_metadata.json when omitted.
        #[arg(long)]
        persona: Option<String>,
        /// Orphaned-chunk ratio above which validation fails.
        #[arg(long, env = "PERSONA_CORPUS_ORPHAN_TOLERANCE")]
        orphan_tolerance: Option<f64>,
    },
    /// Rebuild statistics.json across every persona under a datasets root.
    Stats {
        #[arg(long, env = "PERSONA_CORPUS_DATASETS")]
        datasets_root: PathBuf,
        #[arg(long, default_value = "1.0.0")]
        dataset_version: String,
        /// Defaults to statistics.json under the datasets root.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn print_rule() {
    println!("{}", "=".repeat(80));
}

fn print_processing(summary: &ProcessingSummary) {
    let report = &summary.report;
    print_rule();
    println!("{} processed", summary.metadata.display_name);
    print_rule();
    println!("documents: {}", summary.documents);
    println!(
        "total {}: {} (avg {} per document)",
        report.documents.unit,
        report.documents.total_content_size,
        report.documents.average_size_per_document
    );
    println!(
        "with allusions: {} ({}%)",
        report.documents.with_allusions, report.documents.with_allusions_percentage
    );
    println!(
        "with annotations: {} ({}%)",
        report.documents.with_annotations, report.documents.with_annotations_percentage
    );
    if !report.distribution.top_5_forms.is_empty() {
        println!("top forms:");
        for (form, count) in &report.distribution.top_5_forms {
            println!("  {form}: {count}");
        }
    }
    println!("chunks: {}", summary.chunks);
    for (kind, count) in &report.chunks.chunk_types {
        println!("  {kind}: {count}");
    }
    println!("output: {}", summary.output_dir.display());
}

fn validation_options(
    dir: &Path,
    persona: Option<&str>,
    orphan_tolerance: Option<f64>,
) -> anyhow::Result<ValidationOptions> {
    let base = match persona {
        Some(id) => PersonaProfile::preset(id)?.validation_options(),
        None => match read_json::<DatasetMetadata>(&dir.join(METADATA_FILE)) {
            Ok(metadata) => ValidationOptions::for_measure(metadata.measure),
            Err(error) => {
                warn!(%error, "dataset metadata unavailable, using default size bounds");
                ValidationOptions::default()
            }
        },
    };
    Ok(ValidationOptions {
        orphan_tolerance,
        ..base
    })
}

fn main() -> anyhow::Result<ExitCode> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "persona-corpus boot"
    );

    match cli.command {
        Command::Extract {
            source,
            output,
            filter_field,
            filter_value,
            progress_every,
        } => {
            let field: FilterField = filter_field.parse()?;
            let options = ExtractionOptions {
                filter: RecordFilter {
                    field,
                    value: filter_value,
                },
                progress_every,
            };
            let summary = run_extraction(&source, &output, &options)
                .with_context(|| format!("extracting from {}", source.display()))?;

            print_rule();
            println!("extraction complete");
            print_rule();
            println!("records scanned: {}", summary.scan.records_scanned);
            println!("matches: {}", summary.metadata.total_records);
            if let Some(author_id) = &summary.metadata.author_id {
                println!("author id: {author_id}");
            }
            println!(
                "elapsed: {:.1}s ({:.0} records/s)",
                summary.scan.elapsed_secs,
                summary.scan.records_per_second()
            );
            let stats = &summary.statistics;
            println!("total lines: {}", stats.total_lines);
            println!(
                "with allusions: {} ({}%)",
                stats.records_with_allusions, stats.records_with_allusions_percentage
            );
            if let (Some(earliest), Some(latest)) =
                (&stats.date_range.earliest, &stats.date_range.latest)
            {
                println!("dates: {earliest} .. {latest}");
            }
            println!("output: {}", summary.output.display());
        }
        Command::Process {
            persona,
            input,
            output,
            window_words,
            overlap_words,
            annotation_limit,
        } => {
            let profile = PersonaProfile::preset(&persona)?;
            let options = ChunkingOptions {
                window_words,
                overlap_words,
                document_annotation_limit: annotation_limit,
                chunk_annotation_limit: annotation_limit,
                ..ChunkingOptions::default()
            };
            let summary = match profile.strategy {
                SegmentationStrategy::StructureAware => {
                    process_records(&input, &output, &profile, &options)
                }
                SegmentationStrategy::FixedWindow => {
                    process_articles(&input, &output, &profile, &options)
                }
            }
            .with_context(|| format!("processing {} for {}", input.display(), profile.id))?;
            print_processing(&summary);
        }
        Command::Validate {
            dataset_name,
            dir,
            persona,
            orphan_tolerance,
        } => {
            let options = validation_options(&dir, persona.as_deref(), orphan_tolerance)?;
            let report = validate_directory(&dataset_name, &dir, &options)
                .with_context(|| format!("validating {}", dir.display()))?;

            print_rule();
            println!("validation: {}", report.dataset_name);
            print_rule();
            println!(
                "documents: {}, chunks: {}",
                report.statistics.total_documents, report.statistics.total_chunks
            );
            for issue in &report.issues {
                println!("issue [{:?}] {}: {}", issue.kind, issue.subject, issue.message);
            }
            for warning in &report.warnings {
                println!("warning [{:?}] {}: {}", warning.kind, warning.subject, warning.message);
            }
            println!(
                "{} issue(s), {} warning(s)",
                report.summary.total_issues, report.summary.total_warnings
            );
            if report.passed() {
                println!("VALIDATION PASSED");
                return Ok(ExitCode::SUCCESS);
            }
            println!("VALIDATION FAILED");
            return Ok(ExitCode::FAILURE);
        }
        Command::Stats {
            datasets_root,
            dataset_version,
            output,
        } => {
            let statistics = build_repository_statistics(&datasets_root, &dataset_version)?;
            let target = output.unwrap_or_else(|| datasets_root.join(STATISTICS_FILE));
            write_json_atomic(&target, &statistics)?;

            println!(
                "{} personas, {} documents, {} chunks, {} words",
                statistics.overview.total_personas,
                statistics.overview.total_documents,
                statistics.overview.total_chunks,
                statistics.overview.total_words
            );
            for (id, persona) in &statistics.personas {
                println!(
                    "  {id}: {} documents, {} chunks, validation {}",
                    persona.documents.total,
                    persona.chunks.total,
                    persona.validation_status.as_str()
                );
            }
            println!("written: {}", target.display());
        }
    }

    Ok(ExitCode::SUCCESS)
}
