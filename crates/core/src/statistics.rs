use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::models::{StructuredDocument, TrainingChunk};
use crate::persona::PersonaProfile;

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub(crate) fn average(total: usize, count: usize) -> f64 {
    if count == 0 {
        return 0.0;
    }
    round2(total as f64 / count as f64)
}

pub(crate) fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round2(part as f64 * 100.0 / whole as f64)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SizeSummary {
    pub min: usize,
    pub max: usize,
    pub average: f64,
}

/// Aggregate view over one persona's documents and chunks. Always recomputed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DatasetStatistics {
    pub total_documents: usize,
    pub unique_documents: usize,
    pub total_chunks: usize,
    pub total_content_size: usize,
    pub average_document_size: f64,
    pub documents_with_allusions: usize,
    pub documents_with_allusions_percentage: f64,
    pub documents_with_annotations: usize,
    pub documents_with_annotations_percentage: f64,
    pub document_kinds: BTreeMap<String, usize>,
    pub forms: BTreeMap<String, usize>,
    pub places: BTreeMap<String, usize>,
    pub time_periods: BTreeMap<String, usize>,
    pub chunk_types: BTreeMap<String, usize>,
    pub chunk_size: SizeSummary,
    pub total_chunk_size: usize,
    pub average_chunks_per_document: f64,
}

impl DatasetStatistics {
    pub fn compute(documents: &[StructuredDocument], chunks: &[TrainingChunk]) -> Self {
        let mut stats = DatasetStatistics {
            total_documents: documents.len(),
            total_chunks: chunks.len(),
            ..Self::default()
        };

        let mut ids = HashSet::new();
        for document in documents {
            ids.insert(document.id.as_str());
            let meta = &document.metadata;
            stats.total_content_size += document.content.length;
            if meta.has_allusions {
                stats.documents_with_allusions += 1;
            }
            if meta.has_annotations {
                stats.documents_with_annotations += 1;
            }
            bump(&mut stats.document_kinds, document.kind.as_str());
            bump(&mut stats.forms, &meta.form);
            bump(&mut stats.places, &meta.place);
            bump(&mut stats.time_periods, &meta.time_period);
        }
        stats.unique_documents = ids.len();

        let mut min = usize::MAX;
        for chunk in chunks {
            let size = chunk.measure.measure(&chunk.content);
            stats.total_chunk_size += size;
            min = min.min(size);
            stats.chunk_size.max = stats.chunk_size.max.max(size);
            bump(&mut stats.chunk_types, chunk.chunk_type.as_str());
        }
        if !chunks.is_empty() {
            stats.chunk_size.min = min;
        }
        stats.chunk_size.average = average(stats.total_chunk_size, chunks.len());

        stats.average_document_size = average(stats.total_content_size, documents.len());
        stats.documents_with_allusions_percentage =
            percentage(stats.documents_with_allusions, documents.len());
        stats.documents_with_annotations_percentage =
            percentage(stats.documents_with_annotations, documents.len());
        stats.average_chunks_per_document = average(chunks.len(), documents.len());
        stats
    }

    /// Most frequent forms, ties broken by name.
    pub fn top_forms(&self, limit: usize) -> Vec<(String, usize)> {
        let mut forms: Vec<(String, usize)> = self
            .forms
            .iter()
            .map(|(form, count)| (form.clone(), *count))
            .collect();
        forms.sort_by(|left, right| right.1.cmp(&left.1).then_with(|| left.0.cmp(&right.0)));
        forms.truncate(limit);
        forms
    }
}

fn bump(target: &mut BTreeMap<String, usize>, key: &str) {
    *target.entry(key.to_string()).or_default() += 1;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentSection {
    pub total_documents: usize,
    pub total_content_size: usize,
    pub unit: String,
    pub average_size_per_document: f64,
    pub with_allusions: usize,
    pub with_allusions_percentage: f64,
    pub with_annotations: usize,
    pub with_annotations_percentage: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DistributionSection {
    pub document_kinds: BTreeMap<String, usize>,
    pub forms: BTreeMap<String, usize>,
    pub top_5_forms: Vec<(String, usize)>,
    pub time_periods: usize,
    pub unique_places: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkSection {
    pub total_chunks: usize,
    pub chunk_types: BTreeMap<String, usize>,
    pub average_chunks_per_document: f64,
    pub chunk_size: SizeSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessingReport {
    pub processing_date: String,
    pub persona_id: String,
    pub input: String,
    pub output_directory: String,
    pub documents: DocumentSection,
    pub distribution: DistributionSection,
    pub chunks: ChunkSection,
}

impl ProcessingReport {
    pub fn build(
        profile: &PersonaProfile,
        input: &Path,
        output_dir: &Path,
        stats: &DatasetStatistics,
        processing_date: String,
    ) -> Self {
        Self {
            processing_date,
            persona_id: profile.id.clone(),
            input: input
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_else(|| input.display().to_string()),
            output_directory: output_dir.display().to_string(),
            documents: DocumentSection {
                total_documents: stats.total_documents,
                total_content_size: stats.total_content_size,
                unit: profile.measure.unit().to_string(),
                average_size_per_document: stats.average_document_size,
                with_allusions: stats.documents_with_allusions,
                with_allusions_percentage: stats.documents_with_allusions_percentage,
                with_annotations: stats.documents_with_annotations,
                with_annotations_percentage: stats.documents_with_annotations_percentage,
            },
            distribution: DistributionSection {
                document_kinds: stats.document_kinds.clone(),
                forms: stats.forms.clone(),
                top_5_forms: stats.top_forms(5),
                time_periods: stats.time_periods.len(),
                unique_places: stats.places.len(),
            },
            chunks: ChunkSection {
                total_chunks: stats.total_chunks,
                chunk_types: stats.chunk_types.clone(),
                average_chunks_per_document: stats.average_chunks_per_document,
                chunk_size: stats.chunk_size.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ChunkKind, ContentMeasure, DocumentContent, DocumentMetadata, UNKNOWN,
    };

    fn document(id: &str, form: &str, allusions: bool, length: usize) -> StructuredDocument {
        StructuredDocument {
            id: id.to_string(),
            content: DocumentContent {
                length,
                ..DocumentContent::default()
            },
            metadata: DocumentMetadata {
                form: form.to_string(),
                has_allusions: allusions,
                ..DocumentMetadata::default()
            },
            ..StructuredDocument::default()
        }
    }

    fn chunk(kind: ChunkKind, content: &str) -> TrainingChunk {
        TrainingChunk {
            chunk_type: kind,
            content: content.to_string(),
            measure: ContentMeasure::Characters,
            ..TrainingChunk::default()
        }
    }

    #[test]
    fn counts_distributions_and_sizes() {
        let documents = vec![
            document("a", "七言律诗", true, 56),
            document("b", "五言绝句", false, 20),
            document("c", "七言律诗", false, 56),
            document("d", UNKNOWN, true, 0),
        ];
        let chunks = vec![
            chunk(ChunkKind::PrimaryContent, "abcdefghij"),
            chunk(ChunkKind::AllusionContext, "abcd"),
            chunk(ChunkKind::PrimaryContent, "abcdefghijklmnop"),
        ];
        let stats = DatasetStatistics::compute(&documents, &chunks);

        assert_eq!(stats.total_content_size, 132);
        assert_eq!(stats.average_document_size, 33.0);
        assert_eq!(stats.documents_with_allusions_percentage, 50.0);
        assert_eq!(stats.forms.get("七言律诗"), Some(&2));
        assert_eq!(stats.places.get(UNKNOWN), Some(&4));
        assert_eq!(stats.chunk_types.get("primary_content"), Some(&2));
        assert_eq!(
            stats.chunk_size,
            SizeSummary {
                min: 4,
                max: 16,
                average: 10.0
            }
        );
        assert_eq!(stats.average_chunks_per_document, 0.75);
        assert_eq!(
            stats.top_forms(2),
            vec![("七言律诗".to_string(), 2), ("Unknown".to_string(), 1)]
        );
    }

    #[test]
    fn empty_sets_do_not_divide_by_zero() {
        let stats = DatasetStatistics::compute(&[], &[]);
        assert_eq!(stats.chunk_size, SizeSummary::default());
        assert_eq!(stats.average_chunks_per_document, 0.0);
    }

    #[test]
    fn processing_report_names_the_input_file() -> Result<(), crate::PipelineError> {
        let profile = PersonaProfile::preset("du_fu")?;
        let stats = DatasetStatistics::compute(&[document("a", "七言律诗", true, 56)], &[]);
        let report = ProcessingReport::build(
            &profile,
            Path::new("/data/raw/raw_records.json"),
            Path::new("/data/processed"),
            &stats,
            "2025-10-04T00:00:00Z".to_string(),
        );
        assert_eq!(report.input, "raw_records.json");
        assert_eq!(report.documents.unit, "characters");
        assert_eq!(report.distribution.top_5_forms.len(), 1);
        Ok(())
    }
}
