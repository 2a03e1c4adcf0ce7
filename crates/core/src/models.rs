use crate::error::IngestError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The document currently held by the file store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredDocument {
    pub document_id: String,
    pub file_name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub checksum: String,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    PlainText,
}

impl DocumentFormat {
    pub fn from_file_name(name: &str) -> Option<Self> {
        let extension = std::path::Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())?;

        if extension.eq_ignore_ascii_case("pdf") {
            Some(Self::Pdf)
        } else if extension.eq_ignore_ascii_case("txt") {
            Some(Self::PlainText)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub chunk_index: u64,
    pub page_start: u32,
    pub page_end: u32,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedChunk {
    pub chunk: DocumentChunk,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Answer {
    pub answer: String,
    pub sources: usize,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct RagOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub temperature: f32,
    pub max_upload_bytes: usize,
    pub delete_after_answer: bool,
    pub cache_indexes: bool,
}

impl Default for RagOptions {
    fn default() -> Self {
        Self {
            chunk_size: 1_000,
            chunk_overlap: 200,
            top_k: 5,
            temperature: 0.7,
            max_upload_bytes: 20 * 1024 * 1024,
            delete_after_answer: true,
            cache_indexes: false,
        }
    }
}

impl RagOptions {
    /// Chunk settings are checked by `ChunkingConfig::validate`; this covers retrieval.
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.top_k == 0 {
            return Err(IngestError::InvalidRetrievalConfig(
                "top_k must be at least 1".to_string(),
            ));
        }
        if !self.temperature.is_finite() || self.temperature < 0.0 {
            return Err(IngestError::InvalidRetrievalConfig(format!(
                "temperature {} must be a non-negative number",
                self.temperature
            )));
        }
        Ok(())
    }
}
