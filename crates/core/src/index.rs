use crate::error::ProviderError;
use crate::models::{DocumentChunk, RetrievedChunk};
use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

/// Per-request collection of chunks and their embeddings, searched by cosine
/// similarity. Dropping the index releases it.
#[derive(Debug)]
pub struct EphemeralIndex {
    collection: String,
    dimensions: usize,
    entries: Vec<(DocumentChunk, Vec<f32>)>,
}

/// Fresh collection name, unique per call: `doc-store-<unix millis>-<8 hex>`.
pub fn collection_name() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("doc-store-{}-{}", Utc::now().timestamp_millis(), &suffix[..8])
}

impl EphemeralIndex {
    pub fn build(
        collection: impl Into<String>,
        chunks: Vec<DocumentChunk>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<Self, ProviderError> {
        if chunks.len() != embeddings.len() {
            return Err(ProviderError::CountMismatch {
                expected: chunks.len(),
                got: embeddings.len(),
            });
        }

        let dimensions = embeddings.first().map(Vec::len).unwrap_or_default();
        if let Some(odd) = embeddings.iter().find(|vector| vector.len() != dimensions) {
            return Err(ProviderError::DimensionMismatch {
                expected: dimensions,
                got: odd.len(),
            });
        }

        let collection = collection.into();
        debug!(%collection, chunks = chunks.len(), dimensions, "built ephemeral index");

        Ok(Self {
            collection,
            dimensions,
            entries: chunks.into_iter().zip(embeddings).collect(),
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Top `top_k` chunks by cosine similarity; equal scores keep document order.
    /// Chunks with no positive similarity to the query are not returned.
    pub fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, ProviderError> {
        if !self.entries.is_empty() && query_vector.len() != self.dimensions {
            return Err(ProviderError::DimensionMismatch {
                expected: self.dimensions,
                got: query_vector.len(),
            });
        }

        let mut scored: Vec<RetrievedChunk> = self
            .entries
            .iter()
            .map(|(chunk, vector)| RetrievedChunk {
                chunk: chunk.clone(),
                score: cosine_similarity(query_vector, vector),
            })
            .filter(|hit| hit.score > 0.0)
            .collect();

        scored.sort_by(|left, right| right.score.total_cmp(&left.score));
        scored.truncate(top_k);
        Ok(scored)
    }
}

impl Drop for EphemeralIndex {
    fn drop(&mut self) {
        debug!(collection = %self.collection, "released ephemeral index");
    }
}

pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    if left.len() != right.len() {
        return 0.0;
    }

    let dot: f32 = left.iter().zip(right).map(|(a, b)| a * b).sum();
    let left_norm = left.iter().map(|value| value * value).sum::<f32>().sqrt();
    let right_norm = right.iter().map(|value| value * value).sum::<f32>().sqrt();

    if left_norm == 0.0 || right_norm == 0.0 {
        return 0.0;
    }

    dot / (left_norm * right_norm)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(index: u64, text: &str) -> DocumentChunk {
        DocumentChunk {
            chunk_id: format!("chunk-{index}"),
            document_id: "doc".to_string(),
            chunk_index: index,
            page_start: 1,
            page_end: 1,
            text: text.to_string(),
        }
    }

    #[test]
    fn collection_names_are_unique() {
        let first = collection_name();
        let second = collection_name();
        assert!(first.starts_with("doc-store-"));
        assert_ne!(first, second);
    }

    #[test]
    fn search_ranks_by_similarity() {
        let index = EphemeralIndex::build(
            "test",
            vec![chunk(0, "x axis"), chunk(1, "y axis"), chunk(2, "diagonal")],
            vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0]],
        )
        .expect("consistent input");

        let hits = index.search(&[0.0, 2.0], 2).expect("same dimension");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.text, "y axis");
        assert_eq!(hits[1].chunk.text, "diagonal");
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn ties_keep_document_order() {
        let index = EphemeralIndex::build(
            "test",
            vec![chunk(0, "first"), chunk(1, "second")],
            vec![vec![1.0, 0.0], vec![1.0, 0.0]],
        )
        .expect("consistent input");

        let hits = index.search(&[1.0, 0.0], 5).expect("search");
        assert_eq!(hits[0].chunk.chunk_index, 0);
        assert_eq!(hits[1].chunk.chunk_index, 1);
    }

    #[test]
    fn mismatched_inputs_are_rejected() {
        assert!(EphemeralIndex::build("test", vec![chunk(0, "a")], Vec::new()).is_err());
        assert!(EphemeralIndex::build(
            "test",
            vec![chunk(0, "a"), chunk(1, "b")],
            vec![vec![1.0], vec![1.0, 2.0]],
        )
        .is_err());

        let index = EphemeralIndex::build("test", vec![chunk(0, "a")], vec![vec![1.0, 0.0]])
            .expect("consistent input");
        assert!(index.search(&[1.0], 1).is_err());
    }

    #[test]
    fn unrelated_chunks_are_not_returned() {
        let index = EphemeralIndex::build(
            "test",
            vec![chunk(0, "x axis"), chunk(1, "y axis")],
            vec![vec![1.0, 0.0], vec![0.0, 1.0]],
        )
        .expect("consistent input");

        let hits = index.search(&[0.0, 1.0], 5).expect("search");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.text, "y axis");
        assert!(index.search(&[-1.0, 0.0], 5).expect("search").is_empty());
    }

    #[test]
    fn zero_vectors_score_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }
}
