use clap::{ArgAction, Parser, ValueEnum};
use docchat_core::openai::{DEFAULT_BASE_URL, DEFAULT_CHAT_MODEL, DEFAULT_EMBEDDING_MODEL};
use docchat_core::{
    CharacterNgramEmbedder, Embedder, OpenAiChatModel, OpenAiClient, OpenAiConfig, OpenAiEmbedder,
    Providers, RagOptions, RetryPolicy,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EmbedderKind {
    /// Hosted embeddings from the configured OpenAI-compatible API.
    Openai,
    /// Offline character-trigram hashing, for local development.
    Hashing,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "docchat", version, about = "Upload a document and ask questions about it.")]
pub struct Cli {
    /// Address the HTTP server listens on
    #[arg(long, env = "DOCCHAT_BIND", default_value = "127.0.0.1:3000")]
    pub bind: SocketAddr,

    /// Directory holding the uploaded document
    #[arg(long, env = "DOCCHAT_STORE_DIR", default_value = "tmp")]
    pub store_dir: PathBuf,

    /// Credential for the embedding and chat APIs
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Base URL of the OpenAI-compatible API
    #[arg(long, env = "OPENAI_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub openai_base_url: String,

    /// Chat completion model
    #[arg(long, env = "DOCCHAT_CHAT_MODEL", default_value = DEFAULT_CHAT_MODEL)]
    pub chat_model: String,

    /// Embedding model
    #[arg(long, env = "DOCCHAT_EMBEDDING_MODEL", default_value = DEFAULT_EMBEDDING_MODEL)]
    pub embedding_model: String,

    /// Where chunk and question embeddings come from
    #[arg(long, env = "DOCCHAT_EMBEDDER", value_enum, default_value_t = EmbedderKind::Openai)]
    pub embedder: EmbedderKind,

    /// Sampling temperature for answers
    #[arg(long, env = "DOCCHAT_TEMPERATURE", default_value_t = 0.7)]
    pub temperature: f32,

    /// Number of passages retrieved per question
    #[arg(long, env = "DOCCHAT_TOP_K", default_value_t = 5)]
    pub top_k: usize,

    /// Maximum characters per chunk
    #[arg(long, env = "DOCCHAT_CHUNK_SIZE", default_value_t = 1000)]
    pub chunk_size: usize,

    /// Characters shared between consecutive chunks
    #[arg(long, env = "DOCCHAT_CHUNK_OVERLAP", default_value_t = 200)]
    pub chunk_overlap: usize,

    /// Largest accepted upload, in bytes
    #[arg(long, env = "DOCCHAT_MAX_UPLOAD_BYTES", default_value_t = 20 * 1024 * 1024)]
    pub max_upload_bytes: usize,

    /// Timeout for each model API request, in seconds
    #[arg(long, env = "DOCCHAT_REQUEST_TIMEOUT_SECS", default_value_t = 60)]
    pub request_timeout_secs: u64,

    /// Retries for rate-limited or failed model API calls
    #[arg(long, env = "DOCCHAT_MAX_RETRIES", default_value_t = 3)]
    pub max_retries: u32,

    /// First retry delay in milliseconds; doubles per attempt
    #[arg(long, env = "DOCCHAT_RETRY_BASE_MS", default_value_t = 500)]
    pub retry_base_ms: u64,

    /// Delete the document after a successful answer
    #[arg(long, env = "DOCCHAT_DELETE_AFTER_ANSWER", default_value_t = true, action = ArgAction::Set)]
    pub delete_after_answer: bool,

    /// Reuse the index of an unchanged document across questions
    #[arg(long, env = "DOCCHAT_CACHE_INDEXES", default_value_t = false, action = ArgAction::Set)]
    pub cache_indexes: bool,
}

impl Cli {
    pub fn rag_options(&self) -> RagOptions {
        RagOptions {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            top_k: self.top_k,
            temperature: self.temperature,
            max_upload_bytes: self.max_upload_bytes,
            delete_after_answer: self.delete_after_answer,
            cache_indexes: self.cache_indexes,
        }
    }

    fn api_key(&self) -> Option<&str> {
        self.openai_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    /// `None` when no credential is configured; the chat endpoint then refuses requests.
    pub fn providers(&self) -> anyhow::Result<Option<Providers>> {
        let Some(api_key) = self.api_key() else {
            warn!("OPENAI_API_KEY is not set; /api/chat will answer 500 until it is configured");
            return Ok(None);
        };

        let client = OpenAiClient::new(OpenAiConfig {
            base_url: self.openai_base_url.clone(),
            api_key: api_key.to_string(),
            timeout: Duration::from_secs(self.request_timeout_secs),
            retry: RetryPolicy {
                max_retries: self.max_retries,
                base_delay: Duration::from_millis(self.retry_base_ms),
                ..RetryPolicy::default()
            },
        })?;

        let embedder: Arc<dyn Embedder> = match self.embedder {
            EmbedderKind::Openai => Arc::new(OpenAiEmbedder::new(client.clone(), &self.embedding_model)),
            EmbedderKind::Hashing => Arc::new(CharacterNgramEmbedder::default()),
        };

        Ok(Some(Providers {
            embedder,
            chat: Arc::new(OpenAiChatModel::new(client, &self.chat_model)),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_reference_pipeline() {
        let cli = Cli::try_parse_from(["docchat"]).expect("defaults parse");
        let options = cli.rag_options();

        assert_eq!(options.chunk_size, 1000);
        assert_eq!(options.chunk_overlap, 200);
        assert_eq!(options.top_k, 5);
        assert!(options.delete_after_answer);
        assert!(!options.cache_indexes);
        assert_eq!(cli.chat_model, "gpt-4.1");
        assert_eq!(cli.store_dir, PathBuf::from("tmp"));
    }

    #[test]
    fn blank_api_key_means_no_providers() {
        let cli = Cli::try_parse_from(["docchat", "--openai-api-key", "   "]).expect("parse");
        assert!(cli.providers().expect("no error").is_none());
    }

    #[test]
    fn api_key_builds_providers() {
        let cli = Cli::try_parse_from([
            "docchat",
            "--openai-api-key",
            "sk-test",
            "--embedder",
            "hashing",
            "--delete-after-answer",
            "false",
        ])
        .expect("parse");

        let providers = cli.providers().expect("valid config").expect("configured");
        assert_eq!(providers.chat.model(), "gpt-4.1");
        assert_eq!(providers.embedder.model(), "character-ngram");
        assert!(!cli.rag_options().delete_after_answer);
    }
}
