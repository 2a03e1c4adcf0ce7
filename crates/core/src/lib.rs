pub mod cache;
pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod generation;
pub mod index;
pub mod models;
pub mod openai;
pub mod orchestrator;
pub mod pipeline;
pub mod prompt;
pub mod retry;
pub mod store;

pub use cache::IndexCache;
pub use chunking::{build_chunks, split_text, ChunkingConfig};
pub use embeddings::{CharacterNgramEmbedder, Embedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{ChatError, ErrorKind, IngestError, ProviderError};
pub use extractor::{extract_page_texts, PageText};
pub use generation::ChatModel;
pub use index::EphemeralIndex;
pub use models::{Answer, DocumentChunk, RagOptions, RetrievedChunk, StoredDocument};
pub use openai::{OpenAiChatModel, OpenAiClient, OpenAiConfig, OpenAiEmbedder};
pub use orchestrator::{ChatCoordinator, Providers};
pub use pipeline::IndexingPipeline;
pub use prompt::{build_prompt, GroundedPrompt};
pub use retry::RetryPolicy;
pub use store::FileStore;
