use std::ops::Range;

use tracing::debug;

use crate::error::PipelineError;
use crate::models::{
    ChunkKind, ChunkMetadata, ChunkingOptions, StructuredDocument, TrainingChunk, UNKNOWN,
};
use crate::persona::{PersonaProfile, SegmentationStrategy};

/// Issues chunk ids for one processing run. Ids are never reused within it.
#[derive(Debug, Clone)]
pub struct ChunkSequence {
    prefix: String,
    next: u64,
}

impl ChunkSequence {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: 1,
        }
    }

    pub fn next_id(&mut self) -> String {
        let id = format!("{}_{:04}", self.prefix, self.next);
        self.next = self.next.saturating_add(1);
        id
    }

    pub fn issued(&self) -> u64 {
        self.next - 1
    }
}

struct ChunkDraft {
    kind: ChunkKind,
    content: String,
    metadata: ChunkMetadata,
}

fn finish(
    document: &StructuredDocument,
    drafts: Vec<ChunkDraft>,
    sequence: &mut ChunkSequence,
) -> Vec<TrainingChunk> {
    let measure = document.content.measure;
    drafts
        .into_iter()
        .enumerate()
        .map(|(index, draft)| TrainingChunk {
            chunk_id: sequence.next_id(),
            source_document_id: document.id.clone(),
            chunk_type: draft.kind,
            chunk_index: index,
            size: measure.measure(&draft.content),
            measure,
            content: draft.content,
            metadata: draft.metadata,
        })
        .collect()
}

/// One primary chunk, plus allusion and annotation context chunks when the
/// document carries them.
pub fn segment_structured(
    document: &StructuredDocument,
    options: &ChunkingOptions,
    sequence: &mut ChunkSequence,
) -> Vec<TrainingChunk> {
    let meta = &document.metadata;
    let mut drafts = vec![ChunkDraft {
        kind: ChunkKind::PrimaryContent,
        content: primary_content(document),
        metadata: ChunkMetadata::full(document),
    }];

    if meta.has_allusions {
        let mut parts = vec![
            format!("Poem: {}", document.title),
            String::new(),
            "Literary Allusions and References:".to_string(),
        ];
        parts.extend(
            document
                .content
                .allusions
                .iter()
                .map(|text| format!("  {text}")),
        );
        drafts.push(ChunkDraft {
            kind: ChunkKind::AllusionContext,
            content: parts.join("\n"),
            metadata: ChunkMetadata {
                allusion_count: Some(meta.allusion_count),
                ..ChunkMetadata::narrowed(document)
            },
        });
    }

    if meta.has_annotations {
        let limit = options.chunk_annotation_limit;
        let annotations = &document.content.annotations;
        let mut parts = vec![
            format!("Poem: {}", document.title),
            String::new(),
            "Scholarly Annotations:".to_string(),
        ];
        parts.extend(annotations.iter().take(limit).map(|text| format!("  {text}")));
        if annotations.len() > limit {
            parts.push(format!(
                "\n... and {} more annotations",
                annotations.len() - limit
            ));
        }
        drafts.push(ChunkDraft {
            kind: ChunkKind::AnnotationContext,
            content: parts.join("\n"),
            metadata: ChunkMetadata {
                annotation_count: Some(meta.annotation_count),
                ..ChunkMetadata::narrowed(document)
            },
        });
    }

    finish(document, drafts, sequence)
}

fn primary_content(document: &StructuredDocument) -> String {
    let meta = &document.metadata;
    let mut parts = vec![format!("Poem Title: {}", document.title)];

    if !document.content.lines.is_empty() {
        parts.push("\nPoem Text:".to_string());
        parts.extend(document.content.lines.iter().cloned());
    }

    let known = |value: &str| value != UNKNOWN && !value.is_empty();
    if known(&meta.time_period) {
        parts.push(format!("\nCreation Date: {}", meta.time_period));
    }
    if known(&meta.place) {
        parts.push(format!("Location: {}", meta.place));
    }
    if known(&meta.form) {
        parts.push(format!("Poem Type: {}", meta.form));
    }

    parts.join("\n")
}

/// Word ranges of overlapping windows. Stops once a window reaches the end or
/// the start would not advance.
pub fn window_ranges(len: usize, window: usize, overlap: usize) -> Vec<Range<usize>> {
    let window = window.max(1);
    let stride = window.saturating_sub(overlap);
    let mut ranges = Vec::new();
    let mut start = 0;

    while start < len {
        let end = (start + window).min(len);
        ranges.push(start..end);
        if end == len || stride == 0 {
            break;
        }
        start += stride;
    }

    ranges
}

/// Overlapping word windows over the full text, then a summary chunk when the
/// document has a long enough summary.
pub fn segment_windowed(
    document: &StructuredDocument,
    options: &ChunkingOptions,
    sequence: &mut ChunkSequence,
) -> Vec<TrainingChunk> {
    let words: Vec<&str> = document.content.full_text.split_whitespace().collect();
    let mut ranges = window_ranges(words.len(), options.window_words, options.overlap_words);
    if ranges.is_empty() {
        // Empty text still yields a chunk so validation can flag it.
        ranges.push(0..0);
    }

    let mut drafts: Vec<ChunkDraft> = ranges
        .into_iter()
        .map(|range| ChunkDraft {
            kind: ChunkKind::WindowedSegment,
            content: words[range].join(" "),
            metadata: ChunkMetadata::full(document),
        })
        .collect();

    if let Some(summary) = document
        .content
        .summary
        .as_deref()
        .filter(|summary| summary.chars().count() > options.summary_min_chars)
    {
        drafts.push(ChunkDraft {
            kind: ChunkKind::Summary,
            content: format!("{} - Summary\n\n{}", document.title, summary),
            metadata: ChunkMetadata::full(document),
        });
    }

    finish(document, drafts, sequence)
}

/// Segments every document of one persona with a fresh id sequence.
pub fn segment_documents(
    documents: &[StructuredDocument],
    profile: &PersonaProfile,
    options: &ChunkingOptions,
) -> Result<Vec<TrainingChunk>, PipelineError> {
    options.validate()?;
    let mut sequence = ChunkSequence::new(profile.chunk_prefix());
    let mut chunks = Vec::new();

    for document in documents {
        let produced = match profile.strategy {
            SegmentationStrategy::StructureAware => {
                segment_structured(document, options, &mut sequence)
            }
            SegmentationStrategy::FixedWindow => segment_windowed(document, options, &mut sequence),
        };
        debug!(document = %document.id, chunk_count = produced.len(), "segmented document");
        chunks.extend(produced);
    }

    debug!(
        persona = %profile.id,
        documents = documents.len(),
        chunk_ids_issued = sequence.issued(),
        "segmentation complete"
    );
    Ok(chunks)
}
