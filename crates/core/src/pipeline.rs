use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::chunking::segment_documents;
use crate::error::PipelineError;
use crate::extractor::{extract_records, ExtractionOptions, ScanStats};
use crate::mapper::{disambiguate_ids, map_article_with, map_record, ArticleCleaner};
use crate::models::{
    ChunkingOptions, ContentMeasure, DocumentKind, RawRecord, SourceArticle, StructuredDocument,
    TrainingChunk,
};
use crate::persona::{PersonaProfile, ResourceType};
use crate::record_stats::RecordStatistics;
use crate::statistics::{DatasetStatistics, ProcessingReport};
use crate::validation::{CHUNKS_FILE, DOCUMENTS_FILE, METADATA_FILE};

pub const RAW_RECORDS_FILE: &str = "raw_records.json";
pub const RECORD_STATS_FILE: &str = "record_statistics.json";
pub const PROCESSING_REPORT_FILE: &str = "processing_report.json";

/// Article inputs under a raw directory, in processing order.
pub const ARTICLE_SOURCES: [(&str, DocumentKind, bool); 3] = [
    ("wikipedia/biography.json", DocumentKind::Biography, false),
    ("wikipedia/related_articles.json", DocumentKind::Context, true),
    (
        "supplementary_materials/supplementary_materials.json",
        DocumentKind::Supplementary,
        true,
    ),
];

/// Serialises `value` to a sibling temp file, then renames it over `path`.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), PipelineError> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| {
            PipelineError::InvalidArgument(format!("not a file path: {}", path.display()))
        })?;
    let temp = parent.join(format!(".{file_name}.tmp"));

    let written = (|| {
        let mut writer = BufWriter::new(File::create(&temp)?);
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok::<_, PipelineError>(())
    })();

    if let Err(error) = written {
        let _ = fs::remove_file(&temp);
        return Err(error);
    }
    fs::rename(&temp, path)?;
    Ok(())
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, PipelineError> {
    if !path.is_file() {
        return Err(PipelineError::MissingSource(path.to_path_buf()));
    }
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

pub fn digest_file(path: &Path) -> Result<String, PipelineError> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

fn timestamp() -> String {
    Utc::now().to_rfc3339()
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractionMetadata {
    pub filter_field: String,
    pub filter_value: String,
    pub author_id: Option<String>,
    pub total_records: usize,
    pub records_scanned: u64,
    pub extraction_date: Option<String>,
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawRecordFile {
    pub metadata: ExtractionMetadata,
    pub records: Vec<RawRecord>,
}

#[derive(Debug, Clone)]
pub struct ExtractionSummary {
    pub output: PathBuf,
    pub metadata: ExtractionMetadata,
    pub scan: ScanStats,
    pub statistics: RecordStatistics,
}

/// Streams `source`, keeping matching records, and writes `raw_records.json`
/// plus `record_statistics.json` into `output_dir`.
pub fn run_extraction(
    source: &Path,
    output_dir: &Path,
    options: &ExtractionOptions,
) -> Result<ExtractionSummary, PipelineError> {
    let extraction = extract_records(source, options)?;
    let statistics = RecordStatistics::compute(&extraction.records);

    let metadata = ExtractionMetadata {
        filter_field: options.filter.field.as_str().to_string(),
        filter_value: options.filter.value.clone(),
        author_id: extraction.stats.first_author_id.clone(),
        total_records: extraction.records.len(),
        records_scanned: extraction.stats.records_scanned,
        extraction_date: Some(timestamp()),
        source: file_label(source),
    };
    let file = RawRecordFile {
        metadata,
        records: extraction.records,
    };

    let output = output_dir.join(RAW_RECORDS_FILE);
    write_json_atomic(&output, &file)?;
    write_json_atomic(&output_dir.join(RECORD_STATS_FILE), &statistics)?;
    info!(path = %output.display(), records = file.records.len(), "raw records written");

    Ok(ExtractionSummary {
        output,
        metadata: file.metadata,
        scan: extraction.stats,
        statistics,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceFile {
    pub file: String,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceProvenance {
    pub source_database: String,
    pub files: Vec<SourceFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatasetMetadata {
    pub dataset_name: String,
    pub persona_id: String,
    pub display_name: String,
    pub resource_type: ResourceType,
    pub language: String,
    pub era: String,
    pub total_source_records: usize,
    pub total_documents: usize,
    pub total_chunks: usize,
    pub total_content_size: usize,
    pub measure: ContentMeasure,
    pub extraction_date: Option<String>,
    pub processing_date: String,
    pub provenance: SourceProvenance,
}

#[derive(Debug, Clone)]
pub struct ProcessingSummary {
    pub output_dir: PathBuf,
    pub documents: usize,
    pub chunks: usize,
    pub metadata: DatasetMetadata,
    pub report: ProcessingReport,
}

struct ProcessingInput {
    label: PathBuf,
    source_records: usize,
    extraction_date: Option<String>,
    files: Vec<SourceFile>,
}

fn write_dataset(
    profile: &PersonaProfile,
    options: &ChunkingOptions,
    output_dir: &Path,
    documents: Vec<StructuredDocument>,
    input: ProcessingInput,
) -> Result<ProcessingSummary, PipelineError> {
    let chunks: Vec<TrainingChunk> = segment_documents(&documents, profile, options)?;
    let statistics = DatasetStatistics::compute(&documents, &chunks);
    let processing_date = timestamp();

    let metadata = DatasetMetadata {
        dataset_name: profile.display_name.clone(),
        persona_id: profile.id.clone(),
        display_name: profile.display_name.clone(),
        resource_type: profile.resource_type,
        language: profile.language.clone(),
        era: profile.era.clone(),
        total_source_records: input.source_records,
        total_documents: documents.len(),
        total_chunks: chunks.len(),
        total_content_size: statistics.total_content_size,
        measure: profile.measure,
        extraction_date: input.extraction_date,
        processing_date: processing_date.clone(),
        provenance: SourceProvenance {
            source_database: profile.source_database.clone(),
            files: input.files,
        },
    };
    let report = ProcessingReport::build(
        profile,
        &input.label,
        output_dir,
        &statistics,
        processing_date,
    );

    write_json_atomic(&output_dir.join(DOCUMENTS_FILE), &documents)?;
    write_json_atomic(&output_dir.join(CHUNKS_FILE), &chunks)?;
    write_json_atomic(&output_dir.join(METADATA_FILE), &metadata)?;
    write_json_atomic(&output_dir.join(PROCESSING_REPORT_FILE), &report)?;
    info!(
        persona = %profile.id,
        documents = documents.len(),
        chunk_count = chunks.len(),
        path = %output_dir.display(),
        "dataset written"
    );

    Ok(ProcessingSummary {
        output_dir: output_dir.to_path_buf(),
        documents: documents.len(),
        chunks: chunks.len(),
        metadata,
        report,
    })
}

/// Maps and segments a `raw_records.json` file into the processed artifacts.
pub fn process_records(
    raw_file: &Path,
    output_dir: &Path,
    profile: &PersonaProfile,
    options: &ChunkingOptions,
) -> Result<ProcessingSummary, PipelineError> {
    options.validate()?;
    let raw: RawRecordFile = read_json(raw_file)?;
    let digest = digest_file(raw_file)?;

    let documents: Vec<StructuredDocument> = raw
        .records
        .iter()
        .map(|record| map_record(record, profile, options, raw.metadata.extraction_date.clone()))
        .collect();

    let input = ProcessingInput {
        label: raw_file.to_path_buf(),
        source_records: raw.records.len(),
        extraction_date: raw.metadata.extraction_date,
        files: vec![SourceFile {
            file: file_label(raw_file),
            sha256: digest,
        }],
    };
    write_dataset(profile, options, output_dir, documents, input)
}

fn load_articles(path: &Path, many: bool) -> Result<Vec<SourceArticle>, PipelineError> {
    if many {
        read_json(path)
    } else {
        Ok(vec![read_json(path)?])
    }
}

/// Maps the article files found under `raw_dir`. Missing files are skipped;
/// a directory with none of them is an error.
pub fn process_articles(
    raw_dir: &Path,
    output_dir: &Path,
    profile: &PersonaProfile,
    options: &ChunkingOptions,
) -> Result<ProcessingSummary, PipelineError> {
    options.validate()?;
    let cleaner = ArticleCleaner::new()?;
    let mut documents = Vec::new();
    let mut files = Vec::new();
    let mut source_records = 0;

    for (relative, kind, many) in ARTICLE_SOURCES {
        let path = raw_dir.join(relative);
        if !path.is_file() {
            warn!(path = %path.display(), "article source not found, skipping");
            continue;
        }
        let articles = load_articles(&path, many)?;
        source_records += articles.len();
        for article in &articles {
            documents.push(map_article_with(&cleaner, article, kind, profile)?);
        }
        files.push(SourceFile {
            file: relative.to_string(),
            sha256: digest_file(&path)?,
        });
        info!(path = %path.display(), articles = articles.len(), "articles loaded");
    }

    if files.is_empty() {
        return Err(PipelineError::MissingSource(raw_dir.to_path_buf()));
    }
    disambiguate_ids(&mut documents);

    let input = ProcessingInput {
        label: raw_dir.to_path_buf(),
        source_records,
        extraction_date: None,
        files,
    };
    write_dataset(profile, options, output_dir, documents, input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::RecordFilter;
    use crate::validation::{validate_directory, ValidationReport};
    use tempfile::tempdir;

    const CORPUS: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<Writings>
  <Poem Id="1024" AU="杜甫" AId="7" D="唐" AD="757" AP="长安" T="五言律诗" TS="true">
    <Title C="春望"/>
    <Jus>
      <Ju C="国破山河在，城春草木深。"/>
      <Ju C="感时花溅泪，恨别鸟惊心。"/>
    </Jus>
  </Poem>
  <Poem Id="2048" AU="李白" AId="8">
    <Title C="静夜思"/>
  </Poem>
</Writings>
"#;

    #[test]
    fn atomic_write_replaces_and_leaves_no_temp() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("nested").join("data.json");
        write_json_atomic(&path, &vec![1, 2, 3])?;
        write_json_atomic(&path, &vec![4])?;

        let back: Vec<u32> = read_json(&path)?;
        assert_eq!(back, vec![4]);
        let leftovers = fs::read_dir(path.parent().ok_or("no parent")?)?.count();
        assert_eq!(leftovers, 1);
        Ok(())
    }

    #[test]
    fn digest_is_stable() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("a.json");
        fs::write(&path, b"abc")?;
        assert_eq!(
            digest_file(&path)?,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        Ok(())
    }

    #[test]
    fn reading_a_missing_artifact_fails_up_front() {
        let result: Result<Vec<u32>, _> = read_json(Path::new("/no/such/artifact.json"));
        assert!(matches!(result, Err(PipelineError::MissingSource(_))));
    }

    #[test]
    fn extract_process_validate_end_to_end() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let source = dir.path().join("Writings.xml");
        fs::write(&source, CORPUS)?;
        let raw_dir = dir.path().join("raw_data");
        let processed = dir.path().join("processed_data");

        let options = ExtractionOptions {
            filter: RecordFilter::author("杜甫"),
            ..ExtractionOptions::default()
        };
        let extraction = run_extraction(&source, &raw_dir, &options)?;
        assert_eq!(extraction.metadata.total_records, 1);
        assert_eq!(extraction.metadata.records_scanned, 2);
        assert!(raw_dir.join(RECORD_STATS_FILE).is_file());

        let profile = PersonaProfile::preset("du_fu")?;
        let summary = process_records(
            &extraction.output,
            &processed,
            &profile,
            &ChunkingOptions::default(),
        )?;
        assert_eq!(summary.documents, 1);
        assert_eq!(summary.chunks, 1);
        assert_eq!(summary.metadata.provenance.files[0].file, RAW_RECORDS_FILE);

        let documents: Vec<StructuredDocument> = read_json(&processed.join(DOCUMENTS_FILE))?;
        assert_eq!(documents[0].id, "dufu_1024");

        let report: ValidationReport =
            validate_directory("Du Fu", &processed, &profile.validation_options())?;
        assert!(report.passed(), "{:?}", report.issues);
        Ok(())
    }

    #[test]
    fn articles_are_discovered_and_windowed() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let raw = dir.path().join("raw_data");
        fs::create_dir_all(raw.join("wikipedia"))?;
        let body = (0..900).map(|n| format!("w{n}")).collect::<Vec<_>>().join(" ");
        fs::write(
            raw.join("wikipedia/biography.json"),
            serde_json::to_string(&serde_json::json!({
                "title": "Elon Musk",
                "content": body,
                "summary": "short",
                "url": "https://en.wikipedia.org/wiki/Elon_Musk"
            }))?,
        )?;
        fs::write(
            raw.join("wikipedia/related_articles.json"),
            r#"[{"title": "SpaceX", "content": "Space Exploration Technologies Corp. is a company."}]"#,
        )?;

        let profile = PersonaProfile::preset("elon_musk")?;
        let processed = dir.path().join("processed_data");
        let summary = process_articles(&raw, &processed, &profile, &ChunkingOptions::default())?;

        assert_eq!(summary.documents, 2);
        assert_eq!(summary.chunks, 3);
        assert_eq!(summary.metadata.provenance.files.len(), 2);
        let chunks: Vec<TrainingChunk> = read_json(&processed.join(CHUNKS_FILE))?;
        assert_eq!(chunks[0].source_document_id, "musk_elon_musk");
        assert_eq!(chunks[2].chunk_id, "musk_chunk_0003");
        Ok(())
    }

    #[test]
    fn article_directory_without_sources_is_fatal() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let profile = PersonaProfile::preset("elon_musk")?;
        let result = process_articles(
            dir.path(),
            &dir.path().join("out"),
            &profile,
            &ChunkingOptions::default(),
        );
        assert!(matches!(result, Err(PipelineError::MissingSource(_))));
        assert!(!dir.path().join("out").exists());
        Ok(())
    }

    #[test]
    fn articles_with_colliding_titles_still_validate() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let raw = dir.path().join("raw_data");
        fs::create_dir_all(raw.join("wikipedia"))?;
        fs::write(
            raw.join("wikipedia/related_articles.json"),
            r#"[
                {"title": "Tesla, Inc.", "content": "Tesla designs and sells electric vehicles."},
                {"title": "Tesla Inc", "content": "Tesla also builds stationary battery storage."},
                {"content": "An article collected without a title."},
                {"title": "", "content": "Another article collected without a title."}
            ]"#,
        )?;

        let profile = PersonaProfile::preset("elon_musk")?;
        let processed = dir.path().join("processed_data");
        process_articles(&raw, &processed, &profile, &ChunkingOptions::default())?;

        let documents: Vec<StructuredDocument> = read_json(&processed.join(DOCUMENTS_FILE))?;
        let ids: Vec<&str> = documents.iter().map(|doc| doc.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["musk_tesla_inc", "musk_tesla_inc_2", "musk_untitled", "musk_untitled_2"]
        );
        let chunks: Vec<TrainingChunk> = read_json(&processed.join(CHUNKS_FILE))?;
        assert_eq!(chunks[1].source_document_id, "musk_tesla_inc_2");

        let report = validate_directory("Elon Musk", &processed, &profile.validation_options())?;
        assert!(report.passed(), "{:?}", report.issues);
        Ok(())
    }
}
