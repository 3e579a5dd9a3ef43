use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("xml parse error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("source file not found: {}", .0.display())]
    MissingSource(PathBuf),

    #[error("malformed source: {0}")]
    MalformedSource(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unknown persona: {0}")]
    UnknownPersona(String),
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
