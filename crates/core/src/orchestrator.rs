use crate::cache::IndexCache;
use crate::chunking::ChunkingConfig;
use crate::embeddings::Embedder;
use crate::error::{ChatError, IngestError};
use crate::generation::ChatModel;
use crate::index::EphemeralIndex;
use crate::models::{Answer, RagOptions, StoredDocument};
use crate::pipeline::IndexingPipeline;
use crate::prompt::build_prompt;
use crate::store::FileStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Hosted services behind the answering flow. Absent when no credential is configured.
#[derive(Clone)]
pub struct Providers {
    pub embedder: Arc<dyn Embedder>,
    pub chat: Arc<dyn ChatModel>,
}

pub struct ChatCoordinator {
    store: Arc<FileStore>,
    pipeline: IndexingPipeline,
    providers: Option<Providers>,
    cache: Option<IndexCache>,
    options: RagOptions,
}

impl ChatCoordinator {
    pub fn new(
        store: Arc<FileStore>,
        providers: Option<Providers>,
        options: RagOptions,
    ) -> Result<Self, IngestError> {
        options.validate()?;
        let pipeline = IndexingPipeline::new(ChunkingConfig::from(&options))?;
        let cache = options.cache_indexes.then(IndexCache::new);

        Ok(Self {
            store,
            pipeline,
            providers,
            cache,
            options,
        })
    }

    pub fn store(&self) -> &FileStore {
        &self.store
    }

    pub fn options(&self) -> &RagOptions {
        &self.options
    }

    pub async fn upload(&self, file_name: &str, bytes: &[u8]) -> Result<StoredDocument, ChatError> {
        let document = self.store.put(file_name, bytes).await.map_err(|error| match error {
            IngestError::Io(_) | IngestError::Join(_) => ChatError::Store(error),
            other => ChatError::Upload(other),
        })?;

        if let Some(cache) = &self.cache {
            cache.clear().await;
        }
        Ok(document)
    }

    /// validate → locate → index → retrieve → prompt → generate → cleanup → respond.
    pub async fn answer(
        &self,
        question: &str,
        document_id: Option<&str>,
    ) -> Result<Answer, ChatError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ChatError::InvalidQuestion);
        }
        let providers = self.providers.as_ref().ok_or(ChatError::MissingCredential)?;

        let document = self
            .store
            .current()
            .await
            .map_err(ChatError::Store)?
            .ok_or(ChatError::NoDocument)?;
        if let Some(requested) = document_id {
            if requested != document.document_id {
                return Err(ChatError::UnknownDocument(requested.to_string()));
            }
        }
        let bytes = self
            .store
            .read(&document)
            .await
            .map_err(ChatError::Store)?
            .ok_or_else(|| ChatError::UnknownDocument(document.document_id.clone()))?;

        info!(
            document_id = %document.document_id,
            file_name = %document.file_name,
            "answering question"
        );

        let index = self
            .index_for(&document, bytes, providers.embedder.as_ref())
            .await?;

        let query_vector = providers
            .embedder
            .embed_query(question)
            .await
            .map_err(ChatError::Embedding)?;
        let hits = index
            .search(&query_vector, self.options.top_k)
            .map_err(ChatError::Embedding)?;
        drop(index);

        if hits.is_empty() {
            return Err(ChatError::NoRelevantPassages);
        }
        debug!(sources = hits.len(), "retrieved passages");

        let prompt = build_prompt(question, &hits);
        let answer = providers
            .chat
            .complete(&prompt, self.options.temperature)
            .await
            .map_err(ChatError::Generation)?;

        if self.options.delete_after_answer {
            self.cleanup(&document, providers.embedder.as_ref()).await;
        }

        Ok(Answer {
            answer,
            sources: hits.len(),
            model: providers.chat.model().to_string(),
        })
    }

    async fn index_for(
        &self,
        document: &StoredDocument,
        bytes: Vec<u8>,
        embedder: &dyn Embedder,
    ) -> Result<Arc<EphemeralIndex>, ChatError> {
        let Some(cache) = &self.cache else {
            return self
                .pipeline
                .build(document, bytes, embedder)
                .await
                .map(Arc::new);
        };

        let key = cache_key(document, embedder);
        cache
            .get_or_build(&key, || self.pipeline.build(document, bytes, embedder))
            .await
    }

    /// Best effort: failures are logged and never reach the caller.
    async fn cleanup(&self, document: &StoredDocument, embedder: &dyn Embedder) {
        match self.store.remove(document).await {
            Ok(true) => info!(document_id = %document.document_id, "removed answered document"),
            Ok(false) => debug!(document_id = %document.document_id, "document already gone"),
            Err(error) => warn!(document_id = %document.document_id, %error, "document cleanup failed"),
        }

        if let Some(cache) = &self.cache {
            cache.evict(&cache_key(document, embedder)).await;
        }
    }
}

fn cache_key(document: &StoredDocument, embedder: &dyn Embedder) -> String {
    format!("{}:{}", document.checksum, embedder.model())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::error::{ErrorKind, ProviderError};
    use crate::prompt::GroundedPrompt;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;
    use tokio::sync::Mutex;

    const FRANCISTAN: &str = "Francistan is a small country.\n\nThe capital of Francistan is Parisburg.\n\nIts main export is cheese.";

    #[derive(Default)]
    struct CountingEmbedder {
        inner: CharacterNgramEmbedder,
        document_calls: AtomicUsize,
        query_calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        fn model(&self) -> &str {
            "counting"
        }

        async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
            self.document_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ProviderError::BackendResponse {
                    backend: "fake".to_string(),
                    status: 503,
                    details: "embedding service unavailable".to_string(),
                });
            }
            self.inner.embed_documents(texts).await
        }

        async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
            self.query_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.embed_query(text).await
        }
    }

    #[derive(Default)]
    struct RecordingChat {
        prompts: Mutex<Vec<GroundedPrompt>>,
        fail: bool,
    }

    #[async_trait]
    impl ChatModel for RecordingChat {
        fn model(&self) -> &str {
            "fake-chat"
        }

        async fn complete(
            &self,
            prompt: &GroundedPrompt,
            _temperature: f32,
        ) -> Result<String, ProviderError> {
            self.prompts.lock().await.push(prompt.clone());
            if self.fail {
                return Err(ProviderError::BackendResponse {
                    backend: "fake".to_string(),
                    status: 500,
                    details: "generation exploded".to_string(),
                });
            }
            Ok("Parisburg.".to_string())
        }
    }

    struct Harness {
        coordinator: ChatCoordinator,
        embedder: Arc<CountingEmbedder>,
        chat: Arc<RecordingChat>,
    }

    fn harness(root: &Path, embedder: CountingEmbedder, chat: RecordingChat, options: RagOptions) -> Harness {
        let embedder = Arc::new(embedder);
        let chat = Arc::new(chat);
        let providers = Providers {
            embedder: embedder.clone(),
            chat: chat.clone(),
        };
        let store = Arc::new(FileStore::new(root, options.max_upload_bytes));
        let coordinator =
            ChatCoordinator::new(store, Some(providers), options).expect("valid options");
        Harness {
            coordinator,
            embedder,
            chat,
        }
    }

    fn small_chunks() -> RagOptions {
        RagOptions {
            chunk_size: 60,
            chunk_overlap: 10,
            top_k: 3,
            ..RagOptions::default()
        }
    }

    #[tokio::test]
    async fn blank_question_fails_without_any_io() {
        let dir = tempdir().expect("tempdir");
        let root = dir.path().join("store");
        let h = harness(&root, CountingEmbedder::default(), RecordingChat::default(), small_chunks());

        for question in ["", "   ", "\n\t"] {
            let error = h.coordinator.answer(question, None).await.expect_err("blank question");
            assert!(matches!(error, ChatError::InvalidQuestion));
            assert_eq!(error.kind(), ErrorKind::Validation);
        }
        assert!(!root.exists());
        assert_eq!(h.embedder.document_calls.load(Ordering::SeqCst), 0);
        assert!(h.chat.prompts.lock().await.is_empty());
    }

    #[tokio::test]
    async fn missing_credential_short_circuits_before_the_store() {
        let dir = tempdir().expect("tempdir");
        let store = Arc::new(FileStore::new(dir.path(), 1024));
        let coordinator = ChatCoordinator::new(store, None, small_chunks()).expect("valid options");
        let stored = coordinator.upload("doc.txt", FRANCISTAN.as_bytes()).await.expect("upload");

        let error = coordinator
            .answer("What is the capital of Francistan?", None)
            .await
            .expect_err("no credential");
        assert!(matches!(error, ChatError::MissingCredential));
        assert_eq!(error.kind(), ErrorKind::Configuration);
        assert!(stored.path.exists());
    }

    #[tokio::test]
    async fn empty_store_fails_without_calling_providers() {
        let dir = tempdir().expect("tempdir");
        let h = harness(dir.path(), CountingEmbedder::default(), RecordingChat::default(), small_chunks());

        let error = h.coordinator.answer("anything?", None).await.expect_err("no document");
        assert!(matches!(error, ChatError::NoDocument));
        assert_eq!(h.embedder.document_calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.embedder.query_calls.load(Ordering::SeqCst), 0);
        assert!(h.chat.prompts.lock().await.is_empty());
    }

    #[tokio::test]
    async fn grounded_answer_uses_retrieved_context_and_cleans_up() {
        let dir = tempdir().expect("tempdir");
        let h = harness(dir.path(), CountingEmbedder::default(), RecordingChat::default(), small_chunks());
        let stored = h.coordinator.upload("francistan.txt", FRANCISTAN.as_bytes()).await.expect("upload");

        let answer = h
            .coordinator
            .answer("  What is the capital of Francistan?  ", Some(stored.document_id.as_str()))
            .await
            .expect("answer");

        assert_eq!(answer.answer, "Parisburg.");
        assert_eq!(answer.model, "fake-chat");
        assert_eq!(answer.sources, 3);

        let prompts = h.chat.prompts.lock().await;
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].user.contains("The capital of Francistan is Parisburg."));
        assert!(prompts[0].user.contains("Question: What is the capital of Francistan?"));
        assert!(prompts[0].system.contains("ONLY the context"));

        assert!(!stored.path.exists());
        assert_eq!(h.coordinator.store().current().await.expect("store"), None);
    }

    #[tokio::test]
    async fn embedding_failure_keeps_the_document() {
        let dir = tempdir().expect("tempdir");
        let failing = CountingEmbedder {
            fail: true,
            ..CountingEmbedder::default()
        };
        let h = harness(dir.path(), failing, RecordingChat::default(), small_chunks());
        let stored = h.coordinator.upload("doc.txt", FRANCISTAN.as_bytes()).await.expect("upload");

        let error = h.coordinator.answer("capital?", None).await.expect_err("embedding fails");
        assert!(matches!(error, ChatError::Embedding(_)));
        assert_eq!(error.kind(), ErrorKind::Dependency);
        assert!(!error.to_string().is_empty());
        assert!(stored.path.exists());
        assert!(h.chat.prompts.lock().await.is_empty());
    }

    #[tokio::test]
    async fn generation_failure_keeps_the_document() {
        let dir = tempdir().expect("tempdir");
        let failing = RecordingChat {
            fail: true,
            ..RecordingChat::default()
        };
        let h = harness(dir.path(), CountingEmbedder::default(), failing, small_chunks());
        let stored = h.coordinator.upload("doc.txt", FRANCISTAN.as_bytes()).await.expect("upload");

        let error = h.coordinator.answer("capital?", None).await.expect_err("generation fails");
        assert!(matches!(error, ChatError::Generation(_)));
        assert!(error.to_string().contains("generation exploded"));
        assert!(stored.path.exists());
    }

    #[tokio::test]
    async fn stale_document_id_is_not_found() {
        let dir = tempdir().expect("tempdir");
        let h = harness(dir.path(), CountingEmbedder::default(), RecordingChat::default(), small_chunks());
        let first = h.coordinator.upload("a.txt", b"first document").await.expect("upload");
        h.coordinator.upload("b.txt", b"second document").await.expect("upload");

        let error = h
            .coordinator
            .answer("which?", Some(first.document_id.as_str()))
            .await
            .expect_err("superseded");
        assert!(matches!(error, ChatError::UnknownDocument(_)));
        assert_eq!(h.embedder.document_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unreadable_pdf_is_a_dependency_error() {
        let dir = tempdir().expect("tempdir");
        let h = harness(dir.path(), CountingEmbedder::default(), RecordingChat::default(), small_chunks());
        h.coordinator.upload("broken.pdf", b"%PDF-1.4\n%broken").await.expect("upload");

        let error = h.coordinator.answer("anything?", None).await.expect_err("extraction fails");
        assert!(matches!(error, ChatError::Extraction(_)));
        assert_eq!(error.kind(), ErrorKind::Dependency);
    }

    #[tokio::test]
    async fn kept_documents_answer_repeatedly_from_one_cached_index() {
        let dir = tempdir().expect("tempdir");
        let options = RagOptions {
            delete_after_answer: false,
            cache_indexes: true,
            ..small_chunks()
        };
        let h = harness(dir.path(), CountingEmbedder::default(), RecordingChat::default(), options);
        let stored = h.coordinator.upload("doc.txt", FRANCISTAN.as_bytes()).await.expect("upload");

        h.coordinator.answer("capital?", None).await.expect("first answer");
        h.coordinator.answer("export?", None).await.expect("second answer");

        assert!(stored.path.exists());
        assert_eq!(h.embedder.document_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.embedder.query_calls.load(Ordering::SeqCst), 2);

        h.coordinator.upload("doc.txt", b"replacement text").await.expect("upload");
        h.coordinator.answer("what replaced it?", None).await.expect("third answer");
        assert_eq!(h.embedder.document_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn upload_rejections_are_validation_errors() {
        let dir = tempdir().expect("tempdir");
        let h = harness(dir.path(), CountingEmbedder::default(), RecordingChat::default(), small_chunks());

        let error = h.coordinator.upload("tool.exe", b"MZ").await.expect_err("rejected");
        assert_eq!(error.kind(), ErrorKind::Validation);
    }

    /// Places every chunk on one axis and every question on the other.
    struct OrthogonalEmbedder;

    #[async_trait]
    impl Embedder for OrthogonalEmbedder {
        fn model(&self) -> &str {
            "orthogonal"
        }

        async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }

        async fn embed_query(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
            Ok(vec![0.0, 1.0])
        }
    }

    #[tokio::test]
    async fn unrelated_question_finds_no_passages_and_keeps_the_document() {
        let dir = tempdir().expect("tempdir");
        let chat = Arc::new(RecordingChat::default());
        let providers = Providers {
            embedder: Arc::new(OrthogonalEmbedder),
            chat: chat.clone(),
        };
        let store = Arc::new(FileStore::new(dir.path(), 1024));
        let coordinator =
            ChatCoordinator::new(store, Some(providers), small_chunks()).expect("valid options");
        let stored = coordinator.upload("doc.txt", FRANCISTAN.as_bytes()).await.expect("upload");

        let error = coordinator
            .answer("What is the airspeed of a swallow?", None)
            .await
            .expect_err("nothing relevant");
        assert!(matches!(error, ChatError::NoRelevantPassages));
        assert_eq!(error.kind(), ErrorKind::NotFound);
        assert!(chat.prompts.lock().await.is_empty());
        assert!(stored.path.exists());
    }

    #[test]
    fn zero_top_k_is_a_configuration_error() {
        let dir = tempdir().expect("tempdir");
        let store = Arc::new(FileStore::new(dir.path(), 1024));
        let options = RagOptions {
            top_k: 0,
            ..small_chunks()
        };

        let result = ChatCoordinator::new(store, None, options);
        assert!(matches!(result, Err(IngestError::InvalidRetrievalConfig(_))));
    }
}
