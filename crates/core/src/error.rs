use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("document had no readable text: {0}")]
    EmptyDocument(String),

    #[error("path has no usable file name: {0}")]
    MissingFileName(String),

    #[error("unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("file is {size} bytes, limit is {limit}")]
    FileTooLarge { size: usize, limit: usize },

    #[error("file content does not match its type: {0}")]
    InvalidContent(String),

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid retrieval config: {0}")]
    InvalidRetrievalConfig(String),

    #[error("background task failed: {0}")]
    Join(String),
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("invalid response from {backend} ({status}): {details}")]
    BackendResponse {
        backend: String,
        status: u16,
        details: String,
    },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{backend} returned an empty result")]
    EmptyResponse { backend: String },

    #[error("embedding count {got} doesn't match input count {expected}")]
    CountMismatch { expected: usize, got: usize },

    #[error("embedding dimension {got} != {expected}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Coarse classes every answering failure falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Dependency,
    Configuration,
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Valid question is required.")]
    InvalidQuestion,

    #[error("API key is required.")]
    MissingCredential,

    #[error("No document has been uploaded.")]
    NoDocument,

    #[error("Document {0} is no longer available.")]
    UnknownDocument(String),

    #[error("No relevant passages found.")]
    NoRelevantPassages,

    #[error("Failed to load document content: {0}")]
    Extraction(#[source] IngestError),

    #[error("{0}")]
    Upload(#[source] IngestError),

    #[error("document store error: {0}")]
    Store(#[source] IngestError),

    #[error("embedding service failed: {0}")]
    Embedding(#[source] ProviderError),

    #[error("generation service failed: {0}")]
    Generation(#[source] ProviderError),
}

impl ChatError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChatError::InvalidQuestion | ChatError::Upload(_) => ErrorKind::Validation,
            ChatError::NoDocument
            | ChatError::UnknownDocument(_)
            | ChatError::NoRelevantPassages => ErrorKind::NotFound,
            ChatError::MissingCredential => ErrorKind::Configuration,
            ChatError::Extraction(_)
            | ChatError::Store(_)
            | ChatError::Embedding(_)
            | ChatError::Generation(_) => ErrorKind::Dependency,
        }
    }

    /// Short class name reported alongside dependency failures.
    pub fn class_name(&self) -> &'static str {
        match self {
            ChatError::InvalidQuestion => "InvalidQuestion",
            ChatError::MissingCredential => "MissingCredential",
            ChatError::NoDocument => "NoDocument",
            ChatError::UnknownDocument(_) => "UnknownDocument",
            ChatError::NoRelevantPassages => "NoRelevantPassages",
            ChatError::Extraction(_) => "ExtractionError",
            ChatError::Upload(_) => "UploadRejected",
            ChatError::Store(_) => "StoreError",
            ChatError::Embedding(_) => "EmbeddingError",
            ChatError::Generation(_) => "GenerationError",
        }
    }
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_groups_variants() {
        assert_eq!(ChatError::InvalidQuestion.kind(), ErrorKind::Validation);
        assert_eq!(ChatError::NoDocument.kind(), ErrorKind::NotFound);
        assert_eq!(ChatError::NoRelevantPassages.kind(), ErrorKind::NotFound);
        assert_eq!(ChatError::MissingCredential.kind(), ErrorKind::Configuration);
        assert_eq!(
            ChatError::Embedding(ProviderError::EmptyResponse {
                backend: "openai".to_string()
            })
            .kind(),
            ErrorKind::Dependency
        );
        assert_eq!(
            ChatError::Upload(IngestError::UnsupportedFileType("exe".to_string())).kind(),
            ErrorKind::Validation
        );
    }
}
