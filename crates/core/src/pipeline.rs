use crate::chunking::{build_chunks, ChunkingConfig};
use crate::embeddings::Embedder;
use crate::error::{ChatError, IngestError};
use crate::extractor::{extract_page_texts, PageText};
use crate::index::{collection_name, EphemeralIndex};
use crate::models::StoredDocument;
use tracing::info;

/// Turns one stored document into a searchable [`EphemeralIndex`].
#[derive(Debug, Clone, Copy)]
pub struct IndexingPipeline {
    chunking: ChunkingConfig,
}

impl IndexingPipeline {
    pub fn new(chunking: ChunkingConfig) -> Result<Self, IngestError> {
        chunking.validate()?;
        Ok(Self { chunking })
    }

    pub fn chunking(&self) -> ChunkingConfig {
        self.chunking
    }

    /// Runs the CPU-bound extraction on the blocking pool.
    pub async fn extract(
        &self,
        document: &StoredDocument,
        bytes: Vec<u8>,
    ) -> Result<Vec<PageText>, ChatError> {
        let name = document.file_name.clone();
        let pages = tokio::task::spawn_blocking(move || extract_page_texts(&name, &bytes))
            .await
            .map_err(|error| ChatError::Extraction(IngestError::Join(error.to_string())))?
            .map_err(ChatError::Extraction)?;

        info!(
            document_id = %document.document_id,
            pages = pages.len(),
            "extracted document text"
        );
        Ok(pages)
    }

    pub async fn build(
        &self,
        document: &StoredDocument,
        bytes: Vec<u8>,
        embedder: &dyn Embedder,
    ) -> Result<EphemeralIndex, ChatError> {
        let pages = self.extract(document, bytes).await?;

        let chunks =
            build_chunks(&document.document_id, &pages, self.chunking).map_err(ChatError::Extraction)?;
        if chunks.is_empty() {
            return Err(ChatError::Extraction(IngestError::EmptyDocument(
                document.file_name.clone(),
            )));
        }
        info!(document_id = %document.document_id, chunks = chunks.len(), "split document");

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = embedder
            .embed_documents(&texts)
            .await
            .map_err(ChatError::Embedding)?;

        let index =
            EphemeralIndex::build(collection_name(), chunks, embeddings).map_err(ChatError::Embedding)?;
        info!(
            document_id = %document.document_id,
            collection = index.collection(),
            chunks = index.len(),
            "indexed document"
        );
        Ok(index)
    }
}
