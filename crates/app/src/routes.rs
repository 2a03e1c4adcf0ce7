use crate::error::ApiError;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::response::Html;
use axum::routing::{get, post};
use axum::{Json, Router};
use docchat_core::{Answer, ChatCoordinator};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

const INDEX_HTML: &str = include_str!("../assets/index.html");

/// Room for multipart boundaries and headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<ChatCoordinator>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub message: String,
    pub document_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub document_id: Option<String>,
}

pub fn router(state: AppState) -> Router {
    let body_limit = state
        .coordinator
        .store()
        .max_bytes()
        .saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/", get(index_page))
        .route("/api/upload", post(upload))
        .route("/api/chat", post(chat))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index_page() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut multipart = multipart?;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await?;

        let document = state.coordinator.upload(&file_name, &bytes).await?;
        info!(
            document_id = %document.document_id,
            file_name = %document.file_name,
            size_bytes = document.size_bytes,
            "document uploaded"
        );
        return Ok(Json(UploadResponse {
            message: "Uploaded successfully".to_string(),
            document_id: document.document_id,
        }));
    }

    Err(ApiError::bad_request("No file uploaded"))
}

async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<Answer>, ApiError> {
    let Json(request) = payload?;
    let question = request.question.unwrap_or_default();

    let answer = state
        .coordinator
        .answer(&question, request.document_id.as_deref())
        .await?;
    Ok(Json(answer))
}
