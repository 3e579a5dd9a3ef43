//! Repository-wide `statistics.json`, rebuilt from each persona's processed
//! artifacts under `<root>/<persona_id>/processed_data`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::PipelineError;
use crate::models::{ContentMeasure, StructuredDocument, TrainingChunk};
use crate::persona::{PersonaProfile, ResourceType};
use crate::pipeline::{read_json, DatasetMetadata};
use crate::statistics::{average, percentage};
use crate::validation::{
    ValidationReport, ValidationStatus, CHUNKS_FILE, DOCUMENTS_FILE, METADATA_FILE, REPORT_FILE,
    REQUIRED_FILES,
};

pub const STATISTICS_FILE: &str = "statistics.json";
pub const PROCESSED_DIR: &str = "processed_data";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Overview {
    pub total_personas: usize,
    pub total_documents: usize,
    pub total_chunks: usize,
    pub total_words: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentCounts {
    pub total: usize,
    pub by_type: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentTotals {
    /// Sum of document sizes in the persona's own unit.
    pub total_words: usize,
    pub average_words_per_chunk: f64,
    pub unit: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersonaStatistics {
    pub display_name: String,
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    pub language: String,
    pub era: String,
    pub documents: DocumentCounts,
    pub chunks: DocumentCounts,
    pub content: ContentTotals,
    pub validation_status: ValidationStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QualityMetrics {
    pub data_coverage: String,
    pub unique_sources: usize,
    pub data_validation: ValidationStatus,
    pub format_consistency: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Share {
    pub personas: usize,
    pub documents: usize,
    pub chunks: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Distribution {
    pub by_language: BTreeMap<String, Share>,
    pub by_era: BTreeMap<String, Share>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RepositoryStatistics {
    pub dataset_version: String,
    pub generated_date: String,
    pub overview: Overview,
    pub personas: BTreeMap<String, PersonaStatistics>,
    pub quality_metrics: QualityMetrics,
    pub distribution: Distribution,
}

struct PersonaScan {
    stats: PersonaStatistics,
    complete: bool,
    consistent: bool,
    source_digests: Vec<String>,
}

fn persona_dirs(root: &Path) -> Vec<(String, PathBuf)> {
    WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_dir())
        .filter_map(|entry| {
            let processed = entry.path().join(PROCESSED_DIR);
            let id = entry.file_name().to_str()?.to_string();
            processed.join(DOCUMENTS_FILE).is_file().then_some((id, processed))
        })
        .collect()
}

/// Chunk ids share one `<prefix>_<digits>` shape within a persona.
fn ids_consistent(chunks: &[TrainingChunk]) -> bool {
    let mut prefixes = BTreeSet::new();
    for chunk in chunks {
        match chunk.chunk_id.rsplit_once('_') {
            Some((prefix, number))
                if !number.is_empty() && number.chars().all(|c| c.is_ascii_digit()) =>
            {
                prefixes.insert(prefix);
            }
            _ => return false,
        }
    }
    prefixes.len() <= 1
}

fn scan_persona(id: &str, dir: &Path) -> Result<Option<PersonaScan>, PipelineError> {
    let metadata: Option<DatasetMetadata> = if dir.join(METADATA_FILE).is_file() {
        Some(read_json(&dir.join(METADATA_FILE))?)
    } else {
        None
    };
    let preset = PersonaProfile::preset(id).ok();

    let (display_name, resource_type, language, era, measure) = match (&metadata, &preset) {
        (Some(meta), _) => (
            meta.display_name.clone(),
            meta.resource_type,
            meta.language.clone(),
            meta.era.clone(),
            meta.measure,
        ),
        (None, Some(profile)) => (
            profile.display_name.clone(),
            profile.resource_type,
            profile.language.clone(),
            profile.era.clone(),
            profile.measure,
        ),
        (None, None) => {
            warn!(persona = id, "no dataset metadata and no built-in profile, skipping");
            return Ok(None);
        }
    };

    let documents: Vec<StructuredDocument> = read_json(&dir.join(DOCUMENTS_FILE))?;
    let chunks: Vec<TrainingChunk> = if dir.join(CHUNKS_FILE).is_file() {
        read_json(&dir.join(CHUNKS_FILE))?
    } else {
        Vec::new()
    };

    let validation_status = if dir.join(REPORT_FILE).is_file() {
        read_json::<ValidationReport>(&dir.join(REPORT_FILE))?.status
    } else {
        ValidationStatus::Pending
    };

    let mut documents_by_type = BTreeMap::new();
    for document in &documents {
        *documents_by_type
            .entry(document.kind.as_str().to_string())
            .or_default() += 1;
    }
    let mut chunks_by_type = BTreeMap::new();
    for chunk in &chunks {
        *chunks_by_type
            .entry(chunk.chunk_type.as_str().to_string())
            .or_default() += 1;
    }

    let total_words = documents.iter().map(|document| document.content.length).sum();
    let chunk_size_total = chunks
        .iter()
        .map(|chunk| chunk.measure.measure(&chunk.content))
        .sum();
    let note = (measure == ContentMeasure::Characters).then(|| {
        "Classical Chinese is counted in characters; word totals are character totals".to_string()
    });

    debug!(persona = id, documents = documents.len(), chunk_count = chunks.len(), "persona scanned");
    Ok(Some(PersonaScan {
        complete: REQUIRED_FILES.iter().all(|file| dir.join(file).is_file()),
        consistent: ids_consistent(&chunks),
        source_digests: metadata
            .map(|meta| {
                meta.provenance
                    .files
                    .into_iter()
                    .map(|file| file.sha256)
                    .collect()
            })
            .unwrap_or_default(),
        stats: PersonaStatistics {
            display_name,
            resource_type,
            language,
            era,
            documents: DocumentCounts {
                total: documents.len(),
                by_type: documents_by_type,
            },
            chunks: DocumentCounts {
                total: chunks.len(),
                by_type: chunks_by_type,
            },
            content: ContentTotals {
                total_words,
                average_words_per_chunk: average(chunk_size_total, chunks.len()),
                unit: measure.unit().to_string(),
                note,
            },
            validation_status,
        },
    }))
}

fn add_share(target: &mut BTreeMap<String, Share>, key: &str, stats: &PersonaStatistics) {
    let share = target.entry(key.to_string()).or_default();
    share.personas += 1;
    share.documents += stats.documents.total;
    share.chunks += stats.chunks.total;
}

fn fill_percentages(target: &mut BTreeMap<String, Share>, total_documents: usize) {
    for share in target.values_mut() {
        share.percentage = percentage(share.documents, total_documents);
    }
}

pub fn build_repository_statistics(
    datasets_root: &Path,
    version: &str,
) -> Result<RepositoryStatistics, PipelineError> {
    if !datasets_root.is_dir() {
        return Err(PipelineError::MissingSource(datasets_root.to_path_buf()));
    }

    let mut personas = BTreeMap::new();
    let mut discovered = 0;
    let mut complete = 0;
    let mut consistent = true;
    let mut digests = BTreeSet::new();

    for (id, dir) in persona_dirs(datasets_root) {
        discovered += 1;
        let Some(scan) = scan_persona(&id, &dir)? else {
            continue;
        };
        if scan.complete {
            complete += 1;
        }
        consistent &= scan.consistent;
        digests.extend(scan.source_digests);
        personas.insert(id, scan.stats);
    }

    let overview = Overview {
        total_personas: personas.len(),
        total_documents: personas.values().map(|p| p.documents.total).sum(),
        total_chunks: personas.values().map(|p| p.chunks.total).sum(),
        total_words: personas.values().map(|p| p.content.total_words).sum(),
    };

    let statuses: Vec<ValidationStatus> =
        personas.values().map(|p| p.validation_status).collect();
    let data_validation = if statuses.contains(&ValidationStatus::Failed) {
        ValidationStatus::Failed
    } else if statuses.is_empty() || statuses.contains(&ValidationStatus::Pending) {
        ValidationStatus::Pending
    } else {
        ValidationStatus::Passed
    };

    let mut distribution = Distribution::default();
    for stats in personas.values() {
        add_share(&mut distribution.by_language, &stats.language, stats);
        add_share(&mut distribution.by_era, &stats.era, stats);
    }
    fill_percentages(&mut distribution.by_language, overview.total_documents);
    fill_percentages(&mut distribution.by_era, overview.total_documents);

    Ok(RepositoryStatistics {
        dataset_version: version.to_string(),
        generated_date: Utc::now().to_rfc3339(),
        quality_metrics: QualityMetrics {
            data_coverage: format!("{:.0}%", percentage(complete, discovered)),
            unique_sources: digests.len(),
            data_validation,
            format_consistency: if consistent { "consistent" } else { "inconsistent" }
                .to_string(),
        },
        overview,
        personas,
        distribution,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkingOptions;
    use crate::pipeline::{process_articles, process_records, write_json_atomic, RawRecordFile};
    use crate::validation::validate_directory;
    use std::fs;
    use tempfile::tempdir;

    fn raw_records(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let file: RawRecordFile = serde_json::from_value(serde_json::json!({
            "metadata": {
                "filter_field": "author",
                "filter_value": "杜甫",
                "author_id": "7",
                "total_records": 2,
                "records_scanned": 10,
                "extraction_date": "2025-10-04T00:00:00Z",
                "source": "Writings.xml"
            },
            "records": [
                {"record_id": "1", "title": "春望", "lines": [{"text": "国破山河在，城春草木深。"}]},
                {"record_id": "2", "title": "月夜", "lines": [{"text": "今夜鄜州月，闺中只独看。"}],
                 "allusions": [{"text": "鄜州"}]}
            ]
        }))?;
        write_json_atomic(path, &file)?;
        Ok(())
    }

    #[test]
    fn personas_are_aggregated_from_artifacts() -> Result<(), Box<dyn std::error::Error>> {
        let root = tempdir()?;
        let options = ChunkingOptions::default();

        let du_fu = PersonaProfile::preset("du_fu")?;
        let raw_file = root.path().join("du_fu/raw_data/raw_records.json");
        raw_records(&raw_file)?;
        let du_fu_out = root.path().join("du_fu").join(PROCESSED_DIR);
        process_records(&raw_file, &du_fu_out, &du_fu, &options)?;
        validate_directory("Du Fu", &du_fu_out, &du_fu.validation_options())?;

        let musk = PersonaProfile::preset("elon_musk")?;
        let raw_dir = root.path().join("elon_musk/raw_data");
        fs::create_dir_all(raw_dir.join("wikipedia"))?;
        fs::write(
            raw_dir.join("wikipedia/biography.json"),
            r#"{"title": "Elon Musk", "content": "Elon Reeve Musk is a businessman known for his key roles in Tesla and SpaceX."}"#,
        )?;
        process_articles(&raw_dir, &root.path().join("elon_musk").join(PROCESSED_DIR), &musk, &options)?;

        fs::create_dir_all(root.path().join("notes"))?;

        let stats = build_repository_statistics(root.path(), "1.0.0")?;

        assert_eq!(stats.overview.total_personas, 2);
        assert_eq!(stats.overview.total_documents, 3);
        assert_eq!(stats.overview.total_chunks, 4);
        assert_eq!(stats.overview.total_words, 24 + 15);

        let poet = &stats.personas["du_fu"];
        assert_eq!(poet.chunks.by_type.get("allusion_context"), Some(&1));
        assert!(poet.content.note.as_deref().is_some_and(|note| note.contains("character")));
        assert_eq!(poet.validation_status, ValidationStatus::Passed);
        assert_eq!(stats.personas["elon_musk"].validation_status, ValidationStatus::Pending);

        assert_eq!(stats.quality_metrics.data_coverage, "100%");
        assert_eq!(stats.quality_metrics.unique_sources, 2);
        assert_eq!(stats.quality_metrics.data_validation, ValidationStatus::Pending);
        assert_eq!(stats.quality_metrics.format_consistency, "consistent");

        let chinese = &stats.distribution.by_language["Classical Chinese"];
        assert_eq!(chinese.documents, 2);
        assert_eq!(chinese.percentage, 66.67);
        assert_eq!(stats.distribution.by_era.len(), 2);
        Ok(())
    }

    #[test]
    fn mixed_chunk_id_prefixes_are_inconsistent() {
        let chunk = |id: &str| TrainingChunk {
            chunk_id: id.to_string(),
            ..TrainingChunk::default()
        };
        assert!(ids_consistent(&[chunk("dufu_chunk_0001"), chunk("dufu_chunk_0002")]));
        assert!(!ids_consistent(&[chunk("dufu_chunk_0001"), chunk("musk_chunk_0002")]));
        assert!(!ids_consistent(&[chunk("dufu_chunk_x")]));
    }

    #[test]
    fn missing_root_is_fatal() {
        let result = build_repository_statistics(Path::new("/no/datasets/here"), "1.0.0");
        assert!(matches!(result, Err(PipelineError::MissingSource(_))));
    }
}
