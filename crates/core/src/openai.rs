//! Embedding and chat-completion clients for OpenAI-compatible HTTP APIs.
//!
//! Both clients share one [`OpenAiClient`], which owns the credential, the base URL,
//! the request timeout and the retry policy. Rate limits (429), request timeouts and
//! 5xx responses are retried with exponential backoff; every other failure is
//! returned to the caller as a [`ProviderError`].

use crate::embeddings::Embedder;
use crate::error::ProviderError;
use crate::generation::ChatModel;
use crate::prompt::GroundedPrompt;
use crate::retry::{is_retryable_status, parse_retry_after, RetryPolicy};
use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4.1";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

const BACKEND: &str = "openai";
const EMBEDDING_BATCH_SIZE: usize = 96;
const MAX_ERROR_DETAIL_CHARS: usize = 500;

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    base_url: Url,
    api_key: String,
    http: Client,
    retry: RetryPolicy,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self, ProviderError> {
        let mut base_url = Url::parse(config.base_url.trim())?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            base_url,
            api_key: config.api_key,
            http,
            retry: config.retry,
        })
    }

    pub fn endpoint(&self, path: &str) -> Result<Url, ProviderError> {
        Ok(self.base_url.join(path)?)
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, ProviderError>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        let mut attempt = 0u32;

        loop {
            let sent = self
                .http
                .post(url.clone())
                .bearer_auth(&self.api_key)
                .json(body)
                .send()
                .await;
            attempt += 1;

            match sent {
                Ok(response) if response.status().is_success() => {
                    return Ok(response.json::<R>().await?);
                }
                Ok(response) => {
                    let status = response.status().as_u16();
                    let hint = response
                        .headers()
                        .get(RETRY_AFTER)
                        .and_then(|value| value.to_str().ok())
                        .and_then(parse_retry_after);
                    let body = response.text().await.unwrap_or_default();

                    if is_retryable_status(status) && self.retry.should_retry(attempt) {
                        let delay = self.retry.delay_for(attempt, hint);
                        warn!(%url, status, attempt, delay_ms = delay.as_millis() as u64, "retrying model api call");
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    return Err(ProviderError::BackendResponse {
                        backend: BACKEND.to_string(),
                        status,
                        details: error_message(&body),
                    });
                }
                Err(error) => {
                    let transient = error.is_timeout() || error.is_connect();
                    if transient && self.retry.should_retry(attempt) {
                        let delay = self.retry.delay_for(attempt, None);
                        warn!(%url, %error, attempt, delay_ms = delay.as_millis() as u64, "retrying model api call");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(ProviderError::Http(error));
                }
            }
        }
    }
}

/// Pulls `error.message` out of an OpenAI error body, falling back to the raw text.
fn error_message(body: &str) -> String {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|parsed| {
            parsed
                .pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string());

    message.chars().take(MAX_ERROR_DETAIL_CHARS).collect()
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

fn ordered_embeddings(
    mut response: EmbeddingResponse,
    expected: usize,
) -> Result<Vec<Vec<f32>>, ProviderError> {
    if response.data.len() != expected {
        return Err(ProviderError::CountMismatch {
            expected,
            got: response.data.len(),
        });
    }

    response.data.sort_by_key(|item| item.index);
    let vectors: Vec<Vec<f32>> = response
        .data
        .into_iter()
        .map(|item| item.embedding)
        .collect();

    let dimensions = vectors.first().map(Vec::len).unwrap_or_default();
    if dimensions == 0 {
        return Err(ProviderError::EmptyResponse {
            backend: BACKEND.to_string(),
        });
    }
    if let Some(odd) = vectors.iter().find(|vector| vector.len() != dimensions) {
        return Err(ProviderError::DimensionMismatch {
            expected: dimensions,
            got: odd.len(),
        });
    }

    Ok(vectors)
}

#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    client: OpenAiClient,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(client: OpenAiClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let mut vectors = Vec::with_capacity(texts.len());

        for batch in texts.chunks(EMBEDDING_BATCH_SIZE) {
            let request = EmbeddingRequest {
                model: &self.model,
                input: batch,
            };
            let response: EmbeddingResponse = self.client.post_json("embeddings", &request).await?;
            vectors.extend(ordered_embeddings(response, batch.len())?);
        }

        debug!(model = %self.model, count = vectors.len(), "embedded texts");
        Ok(vectors)
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

fn completion_text(response: ChatResponse) -> Result<String, ProviderError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
        .ok_or_else(|| ProviderError::EmptyResponse {
            backend: BACKEND.to_string(),
        })
}

#[derive(Debug, Clone)]
pub struct OpenAiChatModel {
    client: OpenAiClient,
    model: String,
}

impl OpenAiChatModel {
    pub fn new(client: OpenAiClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        prompt: &GroundedPrompt,
        temperature: f32,
    ) -> Result<String, ProviderError> {
        let request = ChatRequest {
            model: &self.model,
            temperature,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
        };

        let response: ChatResponse = self.client.post_json("chat/completions", &request).await?;
        completion_text(response)
    }
}
