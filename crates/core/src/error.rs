use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("invalid response from {backend} ({status}): {details}")]
    BackendResponse {
        backend: String,
        status: u16,
        details: String,
    },

    #[error("{backend} reported a conflict: {details}")]
    Conflict { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("request failed: {0}")]
    Request(String),
}

impl BackendError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, BackendError::Conflict { .. })
    }
}

#[derive(Debug, Error)]
pub enum RagError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("request body too large: {0}")]
    PayloadTooLarge(String),

    #[error("unsupported file format: {0} (supported: pdf, txt, docx)")]
    UnsupportedFormat(String),

    #[error("a file named \"{0}\" has already been uploaded")]
    DuplicateFilename(String),

    #[error("could not extract text: {0}")]
    Extraction(String),

    #[error("chunking failed: {0}")]
    Chunking(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("the knowledge base is empty; upload a file first")]
    EmptyCorpus,

    #[error("no relevant content was found for the question")]
    NoRelevantContent,

    #[error("object storage failure: {0}")]
    Storage(String),

    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("embedding failure: {0}")]
    Embedding(String),

    #[error("query failure: {0}")]
    Query(String),
}

impl RagError {
    pub fn status_code(&self) -> u16 {
        match self {
            RagError::Validation(_)
            | RagError::UnsupportedFormat(_)
            | RagError::DuplicateFilename(_)
            | RagError::Extraction(_)
            | RagError::Chunking(_) => 400,
            RagError::Authentication(_) => 401,
            RagError::PayloadTooLarge(_) => 413,
            RagError::Forbidden(_) => 403,
            RagError::NotFound(_) | RagError::EmptyCorpus | RagError::NoRelevantContent => 404,
            RagError::Storage(_)
            | RagError::Persistence(_)
            | RagError::Embedding(_)
            | RagError::Query(_) => 500,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RagError::Validation(_) => "validation_error",
            RagError::PayloadTooLarge(_) => "payload_too_large",
            RagError::UnsupportedFormat(_) => "unsupported_format",
            RagError::DuplicateFilename(_) => "duplicate_filename",
            RagError::Extraction(_) => "extraction_failure",
            RagError::Chunking(_) => "chunking_failure",
            RagError::Authentication(_) => "authentication_failure",
            RagError::Forbidden(_) => "forbidden",
            RagError::NotFound(_) => "not_found",
            RagError::EmptyCorpus => "empty_corpus",
            RagError::NoRelevantContent => "no_relevant_content",
            RagError::Storage(_) => "storage_failure",
            RagError::Persistence(_) => "persistence_failure",
            RagError::Embedding(_) => "embedding_failure",
            RagError::Query(_) => "query_failure",
        }
    }
}

pub type Result<T, E = RagError> = std::result::Result<T, E>;
