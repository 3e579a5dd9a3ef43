use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::error::PipelineError;

/// Display sentinel for categorical fields the source left unset.
pub const UNKNOWN: &str = "Unknown";

/// How content size is counted for a persona.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContentMeasure {
    /// One unit per character; used for logographic scripts.
    #[default]
    Characters,
    /// One unit per whitespace-delimited token.
    Words,
}

impl ContentMeasure {
    pub fn measure(self, text: &str) -> usize {
        match self {
            ContentMeasure::Characters => text.chars().count(),
            ContentMeasure::Words => text.split_whitespace().count(),
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            ContentMeasure::Characters => "characters",
            ContentMeasure::Words => "words",
        }
    }
}

/// Annotation discriminator as found in the `T` attribute of a note element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AnnotationKind {
    Text,
    WordDict,
    CharDict,
    AllusionKey,
    Image,
    /// Unrecognised tag, kept verbatim and ignored downstream.
    Other(String),
}

impl AnnotationKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "Text" => AnnotationKind::Text,
            "WordDictInJson" => AnnotationKind::WordDict,
            "CharDictInJson" => AnnotationKind::CharDict,
            "AllusionKey" => AnnotationKind::AllusionKey,
            "Image" => AnnotationKind::Image,
            other => AnnotationKind::Other(other.to_string()),
        }
    }

    pub fn tag(&self) -> &str {
        match self {
            AnnotationKind::Text => "Text",
            AnnotationKind::WordDict => "WordDictInJson",
            AnnotationKind::CharDict => "CharDictInJson",
            AnnotationKind::AllusionKey => "AllusionKey",
            AnnotationKind::Image => "Image",
            AnnotationKind::Other(tag) => tag,
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, AnnotationKind::Other(_))
    }
}

impl From<String> for AnnotationKind {
    fn from(value: String) -> Self {
        AnnotationKind::from_tag(&value)
    }
}

impl From<AnnotationKind> for String {
    fn from(value: AnnotationKind) -> Self {
        value.tag().to_string()
    }
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Annotation {
    pub kind: AnnotationKind,
    pub index: Option<String>,
    #[serde(default)]
    pub content: String,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Allusion {
    pub allusion_id: Option<String>,
    pub sentence_index: Option<String>,
    pub text: String,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PoemLine {
    pub text: String,
    pub tone: Option<String>,
    pub rhyme: Option<String>,
    pub annotations: Vec<Annotation>,
}

/// One record as read from the source corpus, before structuring.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RawRecord {
    pub record_id: Option<String>,
    pub group_number: Option<String>,
    pub dynasty: Option<String>,
    pub author: Option<String>,
    pub author_id: Option<String>,
    pub creation_date: Option<String>,
    pub place_code: Option<String>,
    pub form: Option<String>,
    pub form_detail: Option<String>,
    pub rhyme_category: Option<String>,
    pub rhyme_number: Option<String>,
    pub final_rhyme: Option<String>,
    pub has_title: bool,
    pub title: Option<String>,
    pub title_annotations: Vec<Annotation>,
    pub lines: Vec<PoemLine>,
    pub allusions: Vec<Allusion>,
    pub source_citations: Vec<String>,
    /// Every note in the record regardless of where it was nested.
    pub annotations: Vec<Annotation>,
    pub sentence_indices: Vec<Vec<u32>>,
}

impl RawRecord {
    pub fn line_texts(&self) -> Vec<String> {
        self.lines.iter().map(|line| line.text.clone()).collect()
    }

    pub fn allusion_texts(&self) -> Vec<String> {
        self.allusions
            .iter()
            .map(|allusion| allusion.text.trim())
            .filter(|text| !text.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Non-empty free-text notes, in source order.
    pub fn text_annotations(&self) -> Vec<String> {
        self.annotations_of(&AnnotationKind::Text)
            .map(|annotation| annotation.content.trim())
            .filter(|content| !content.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn annotations_of<'a>(
        &'a self,
        kind: &'a AnnotationKind,
    ) -> impl Iterator<Item = &'a Annotation> + 'a {
        self.annotations
            .iter()
            .filter(move |annotation| &annotation.kind == kind)
    }
}

/// One article-shaped input for word-counted personas.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SourceArticle {
    pub title: Option<String>,
    pub content: Option<String>,
    pub summary: Option<String>,
    pub url: Option<String>,
    pub category: Option<String>,
    pub collected: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    #[default]
    Poem,
    Biography,
    Context,
    Supplementary,
}

impl DocumentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentKind::Poem => "poem",
            DocumentKind::Biography => "biography",
            DocumentKind::Context => "context",
            DocumentKind::Supplementary => "supplementary",
        }
    }
}

#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DocumentSource {
    pub database: String,
    pub record_id: Option<String>,
    pub author: Option<String>,
    pub author_id: Option<String>,
    pub url: Option<String>,
    pub collected: Option<String>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DocumentContent {
    pub full_text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub lines: Vec<String>,
    pub line_count: usize,
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub allusions: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<String>,
    pub length: usize,
    pub measure: ContentMeasure,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DocumentMetadata {
    pub persona: String,
    pub time_period: String,
    pub place: String,
    pub form: String,
    pub form_detail: String,
    pub rhyme_category: String,
    pub has_allusions: bool,
    pub allusion_count: usize,
    pub has_annotations: bool,
    pub annotation_count: usize,
    pub language: String,
    pub content_category: String,
}

impl Default for DocumentMetadata {
    fn default() -> Self {
        Self {
            persona: String::new(),
            time_period: UNKNOWN.to_string(),
            place: UNKNOWN.to_string(),
            form: UNKNOWN.to_string(),
            form_detail: UNKNOWN.to_string(),
            rhyme_category: UNKNOWN.to_string(),
            has_allusions: false,
            allusion_count: 0,
            has_annotations: false,
            annotation_count: 0,
            language: String::new(),
            content_category: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StructuredDocument {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: DocumentKind,
    pub title: String,
    pub source: DocumentSource,
    pub content: DocumentContent,
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    #[default]
    PrimaryContent,
    AllusionContext,
    AnnotationContext,
    Summary,
    WindowedSegment,
}

impl ChunkKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChunkKind::PrimaryContent => "primary_content",
            ChunkKind::AllusionContext => "allusion_context",
            ChunkKind::AnnotationContext => "annotation_context",
            ChunkKind::Summary => "summary",
            ChunkKind::WindowedSegment => "windowed_segment",
        }
    }
}

/// Retrieval-filter metadata carried by a chunk.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChunkMetadata {
    pub persona: String,
    pub time_period: String,
    pub document_title: String,
    pub language: String,
    pub form: Option<String>,
    pub place: Option<String>,
    pub content_category: Option<String>,
    pub has_allusions: Option<bool>,
    pub allusion_count: Option<usize>,
    pub has_annotations: Option<bool>,
    pub annotation_count: Option<usize>,
}

impl ChunkMetadata {
    /// Every document field, unmodified.
    pub fn full(document: &StructuredDocument) -> Self {
        let meta = &document.metadata;
        Self {
            persona: meta.persona.clone(),
            time_period: meta.time_period.clone(),
            document_title: document.title.clone(),
            language: meta.language.clone(),
            form: Some(meta.form.clone()),
            place: Some(meta.place.clone()),
            content_category: Some(meta.content_category.clone()),
            has_allusions: Some(meta.has_allusions),
            allusion_count: Some(meta.allusion_count),
            has_annotations: Some(meta.has_annotations),
            annotation_count: Some(meta.annotation_count),
        }
    }

    /// The subset needed to filter by persona, period, title and form.
    pub fn narrowed(document: &StructuredDocument) -> Self {
        let meta = &document.metadata;
        Self {
            persona: meta.persona.clone(),
            time_period: meta.time_period.clone(),
            document_title: document.title.clone(),
            language: meta.language.clone(),
            form: Some(meta.form.clone()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrainingChunk {
    pub chunk_id: String,
    pub source_document_id: String,
    pub chunk_type: ChunkKind,
    pub chunk_index: usize,
    pub content: String,
    pub size: usize,
    pub measure: ContentMeasure,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone)]
pub struct ChunkingOptions {
    pub window_words: usize,
    pub overlap_words: usize,
    /// Annotations rendered in a document's full text.
    pub document_annotation_limit: usize,
    /// Annotations rendered in an annotation-context chunk.
    pub chunk_annotation_limit: usize,
    pub summary_min_chars: usize,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            window_words: 500,
            overlap_words: 100,
            document_annotation_limit: 5,
            chunk_annotation_limit: 5,
            summary_min_chars: 100,
        }
    }
}

impl ChunkingOptions {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.window_words == 0 {
            return Err(PipelineError::InvalidChunkConfig(
                "window size must be at least one word".to_string(),
            ));
        }
        if self.chunk_annotation_limit == 0 || self.document_annotation_limit == 0 {
            return Err(PipelineError::InvalidChunkConfig(
                "annotation limits must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn stride(&self) -> usize {
        self.window_words.saturating_sub(self.overlap_words)
    }
}

#[derive(Debug, Clone)]
pub struct ValidationOptions {
    pub min_chunk_size: usize,
    pub max_chunk_size: usize,
    /// Orphaned-chunk ratio above which orphans fail validation. `None` keeps them warnings.
    pub orphan_tolerance: Option<f64>,
}

impl ValidationOptions {
    pub fn for_measure(measure: ContentMeasure) -> Self {
        match measure {
            ContentMeasure::Characters => Self {
                min_chunk_size: 10,
                max_chunk_size: 1_000,
                orphan_tolerance: None,
            },
            ContentMeasure::Words => Self {
                min_chunk_size: 10,
                max_chunk_size: 1_500,
                orphan_tolerance: None,
            },
        }
    }
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self::for_measure(ContentMeasure::Words)
    }
}
