//! Observational checks over one persona dataset. Nothing here mutates input
//! and data-quality findings are values, not errors.

use std::collections::HashSet;
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::models::{StructuredDocument, TrainingChunk, ValidationOptions};
use crate::pipeline::{read_json, write_json_atomic};
use crate::statistics::DatasetStatistics;

pub const DOCUMENTS_FILE: &str = "structured_documents.json";
pub const CHUNKS_FILE: &str = "training_chunks.json";
pub const METADATA_FILE: &str = "dataset_metadata.json";
pub const REPORT_FILE: &str = "validation_report.json";

pub const REQUIRED_FILES: [&str; 3] = [DOCUMENTS_FILE, CHUNKS_FILE, METADATA_FILE];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    MissingFile,
    UnreadableFile,
    EmptyDataset,
    MissingId,
    MissingTitle,
    DuplicateDocumentId,
    DuplicateChunkId,
    OrphanedChunk,
    EmptyContent,
    ChunkSizeOutOfRange,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationIssue {
    pub kind: IssueKind,
    /// File name, document id or chunk id the finding is about.
    pub subject: String,
    pub message: String,
}

impl ValidationIssue {
    fn new(kind: IssueKind, subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            subject: subject.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Passed,
    Failed,
    Pending,
}

impl ValidationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ValidationStatus::Passed => "passed",
            ValidationStatus::Failed => "failed",
            ValidationStatus::Pending => "pending",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationSummary {
    pub total_issues: usize,
    pub total_warnings: usize,
    pub validation_passed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationReport {
    pub dataset_name: String,
    pub validation_date: String,
    pub status: ValidationStatus,
    pub statistics: DatasetStatistics,
    pub issues: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
    pub summary: ValidationSummary,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.status == ValidationStatus::Passed
    }
}

#[derive(Default)]
struct Findings {
    issues: Vec<ValidationIssue>,
    warnings: Vec<ValidationIssue>,
}

impl Findings {
    fn into_report(self, dataset_name: &str, statistics: DatasetStatistics) -> ValidationReport {
        let passed = self.issues.is_empty();
        ValidationReport {
            dataset_name: dataset_name.to_string(),
            validation_date: Utc::now().to_rfc3339(),
            status: if passed {
                ValidationStatus::Passed
            } else {
                ValidationStatus::Failed
            },
            statistics,
            summary: ValidationSummary {
                total_issues: self.issues.len(),
                total_warnings: self.warnings.len(),
                validation_passed: passed,
            },
            issues: self.issues,
            warnings: self.warnings,
        }
    }
}

pub fn validate_dataset(
    documents: &[StructuredDocument],
    chunks: &[TrainingChunk],
    options: &ValidationOptions,
) -> ValidationReport {
    validate_named("dataset", documents, chunks, options, Findings::default())
}

fn validate_named(
    dataset_name: &str,
    documents: &[StructuredDocument],
    chunks: &[TrainingChunk],
    options: &ValidationOptions,
    mut findings: Findings,
) -> ValidationReport {
    check_documents(documents, &mut findings);
    check_chunks(documents, chunks, options, &mut findings);
    let statistics = DatasetStatistics::compute(documents, chunks);
    findings.into_report(dataset_name, statistics)
}

fn check_documents(documents: &[StructuredDocument], findings: &mut Findings) {
    if documents.is_empty() {
        findings.issues.push(ValidationIssue::new(
            IssueKind::EmptyDataset,
            DOCUMENTS_FILE,
            "no documents found",
        ));
        return;
    }

    let mut seen = HashSet::new();
    let mut reported = HashSet::new();
    for (position, document) in documents.iter().enumerate() {
        let subject = if document.id.is_empty() {
            format!("document[{position}]")
        } else {
            document.id.clone()
        };

        if document.id.trim().is_empty() {
            findings.issues.push(ValidationIssue::new(
                IssueKind::MissingId,
                &subject,
                "document has no id",
            ));
        } else if !seen.insert(document.id.as_str()) && reported.insert(document.id.as_str()) {
            findings.issues.push(ValidationIssue::new(
                IssueKind::DuplicateDocumentId,
                &subject,
                "document id appears more than once",
            ));
        }

        if document.title.trim().is_empty() {
            findings.warnings.push(ValidationIssue::new(
                IssueKind::MissingTitle,
                &subject,
                "document has no title",
            ));
        }
        if document.content.full_text.trim().is_empty() {
            findings.issues.push(ValidationIssue::new(
                IssueKind::EmptyContent,
                &subject,
                "document content is empty",
            ));
        }
    }
}

fn check_chunks(
    documents: &[StructuredDocument],
    chunks: &[TrainingChunk],
    options: &ValidationOptions,
    findings: &mut Findings,
) {
    if chunks.is_empty() {
        findings.issues.push(ValidationIssue::new(
            IssueKind::EmptyDataset,
            CHUNKS_FILE,
            "no chunks found",
        ));
        return;
    }

    let document_ids: HashSet<&str> = documents
        .iter()
        .map(|document| document.id.as_str())
        .filter(|id| !id.trim().is_empty())
        .collect();
    let mut seen = HashSet::new();
    let mut reported = HashSet::new();
    let mut orphans = Vec::new();

    for (position, chunk) in chunks.iter().enumerate() {
        let subject = if chunk.chunk_id.is_empty() {
            format!("chunk[{position}]")
        } else {
            chunk.chunk_id.clone()
        };

        if chunk.chunk_id.trim().is_empty() {
            findings.issues.push(ValidationIssue::new(
                IssueKind::MissingId,
                &subject,
                "chunk has no id",
            ));
        } else if !seen.insert(chunk.chunk_id.as_str()) && reported.insert(chunk.chunk_id.as_str()) {
            findings.issues.push(ValidationIssue::new(
                IssueKind::DuplicateChunkId,
                &subject,
                "chunk id appears more than once",
            ));
        }

        if !document_ids.contains(chunk.source_document_id.as_str()) {
            orphans.push(ValidationIssue::new(
                IssueKind::OrphanedChunk,
                &subject,
                format!(
                    "source document '{}' does not exist",
                    chunk.source_document_id
                ),
            ));
        }

        if chunk.content.trim().is_empty() {
            findings.issues.push(ValidationIssue::new(
                IssueKind::EmptyContent,
                &subject,
                "chunk content is empty",
            ));
            continue;
        }

        let size = chunk.measure.measure(&chunk.content);
        if size < options.min_chunk_size || size > options.max_chunk_size {
            findings.warnings.push(ValidationIssue::new(
                IssueKind::ChunkSizeOutOfRange,
                &subject,
                format!(
                    "{size} {} outside expected range {}..={}",
                    chunk.measure.unit(),
                    options.min_chunk_size,
                    options.max_chunk_size
                ),
            ));
        }
    }

    if orphans.is_empty() {
        return;
    }
    let ratio = orphans.len() as f64 / chunks.len() as f64;
    match options.orphan_tolerance {
        Some(tolerance) if ratio > tolerance => {
            warn!(orphans = orphans.len(), ratio, tolerance, "orphaned chunks exceed tolerance");
            findings.issues.extend(orphans);
        }
        _ => findings.warnings.extend(orphans),
    }
}

fn load_artifact<T>(dir: &Path, file: &str, findings: &mut Findings) -> Option<T>
where
    T: serde::de::DeserializeOwned,
{
    let path = dir.join(file);
    if !path.is_file() {
        findings.issues.push(ValidationIssue::new(
            IssueKind::MissingFile,
            file,
            "required file is missing",
        ));
        return None;
    }
    match read_json(&path) {
        Ok(value) => Some(value),
        Err(error) => {
            findings.issues.push(ValidationIssue::new(
                IssueKind::UnreadableFile,
                file,
                error.to_string(),
            ));
            None
        }
    }
}

/// Validates the artifacts in `dir` and always writes `validation_report.json`
/// there, whatever the outcome.
pub fn validate_directory(
    dataset_name: &str,
    dir: &Path,
    options: &ValidationOptions,
) -> Result<ValidationReport, PipelineError> {
    if !dir.is_dir() {
        return Err(PipelineError::MissingSource(dir.to_path_buf()));
    }

    let mut findings = Findings::default();
    let documents: Vec<StructuredDocument> =
        load_artifact(dir, DOCUMENTS_FILE, &mut findings).unwrap_or_default();
    let chunks: Vec<TrainingChunk> =
        load_artifact(dir, CHUNKS_FILE, &mut findings).unwrap_or_default();
    let _metadata: Option<serde_json::Value> = load_artifact(dir, METADATA_FILE, &mut findings);

    let report = validate_named(dataset_name, &documents, &chunks, options, findings);
    write_json_atomic(&dir.join(REPORT_FILE), &report)?;
    info!(
        dataset = dataset_name,
        status = report.status.as_str(),
        issues = report.summary.total_issues,
        warnings = report.summary.total_warnings,
        "validation finished"
    );
    Ok(report)
}
