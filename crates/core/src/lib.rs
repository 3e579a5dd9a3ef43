pub mod aggregate;
pub mod chunking;
pub mod error;
pub mod extractor;
pub mod mapper;
pub mod models;
pub mod persona;
pub mod pipeline;
pub mod record_stats;
pub mod statistics;
pub mod validation;

pub use aggregate::{build_repository_statistics, RepositoryStatistics, STATISTICS_FILE};
pub use chunking::{
    segment_documents, segment_structured, segment_windowed, window_ranges, ChunkSequence,
};
pub use error::{PipelineError, Result};
pub use extractor::{
    extract_records, Extraction, ExtractionOptions, FilterField, RecordFilter, RecordStream,
    ScanStats,
};
pub use mapper::{
    clean_article_text, disambiguate_ids, document_id, map_article, map_record, ArticleCleaner,
};
pub use models::{
    Allusion, Annotation, AnnotationKind, ChunkKind, ChunkMetadata, ChunkingOptions,
    ContentMeasure, DocumentContent, DocumentKind, DocumentMetadata, DocumentSource, PoemLine,
    RawRecord, SourceArticle, StructuredDocument, TrainingChunk, ValidationOptions, UNKNOWN,
};
pub use persona::{PersonaProfile, ResourceType, SegmentationStrategy};
pub use pipeline::{
    digest_file, process_articles, process_records, read_json, run_extraction, write_json_atomic,
    DatasetMetadata, ExtractionSummary, ProcessingSummary, RawRecordFile,
};
pub use record_stats::RecordStatistics;
pub use statistics::{DatasetStatistics, ProcessingReport};
pub use validation::{
    validate_dataset, validate_directory, IssueKind, ValidationIssue, ValidationReport,
    ValidationStatus,
};
