use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("document has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("document id already stored: {0}")]
    DuplicateDocument(String),

    #[error("text extraction timed out after {0:?}")]
    Timeout(std::time::Duration),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("document not found: {0}")]
    DocumentNotFound(String),

    #[error("embedding provider {provider} failed: {details}")]
    Provider { provider: String, details: String },
}

impl SearchError {
    pub fn provider(provider: impl Into<String>, details: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            details: details.into(),
        }
    }

    /// Validation failures are the caller's fault; provider failures mean the
    /// semantic fallback is unusable right now.
    pub fn is_provider_failure(&self) -> bool {
        matches!(self, Self::Provider { .. })
    }
}
