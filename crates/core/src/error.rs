use std::path::PathBuf;

use thiserror::Error;

use crate::extractor::Stage;

#[derive(Error, Debug)]
pub enum SectionsError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serde json error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("pdf error: {0}")]
    Pdf(#[from] lopdf::Error),
    #[error("document not found: {0:?}")]
    NotFound(PathBuf),
    #[error("failed to open {path:?}: {message}")]
    Open { path: PathBuf, message: String },
    #[error("page {index} out of range ({count} pages)")]
    PageOutOfRange { index: usize, count: usize },
    #[error("invalid cleanup config: {0}")]
    Config(String),
    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("{stage} stage failed: {message}")]
    Stage { stage: Stage, message: String },
    #[error("other: {0}")]
    Other(String),
}

impl SectionsError {
    /// Errors raised while opening or reading the document itself.
    pub fn is_source_error(&self) -> bool {
        matches!(
            self,
            Self::Io(_)
                | Self::Pdf(_)
                | Self::NotFound(_)
                | Self::Open { .. }
                | Self::PageOutOfRange { .. }
        )
    }

    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, SectionsError>;
