use axum::extract::multipart::MultipartError;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use docchat_core::{ChatError, ErrorKind, IngestError};
use serde::Serialize;
use tracing::{error, warn};

/// JSON error body: `{"error": "...", "details": "..."}`.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    details: Option<String>,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            details: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

fn status_for(error: &ChatError) -> StatusCode {
    match error {
        ChatError::Upload(IngestError::FileTooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
        ChatError::NoDocument => StatusCode::BAD_REQUEST,
        _ => match error.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Dependency | ErrorKind::Configuration => StatusCode::INTERNAL_SERVER_ERROR,
        },
    }
}

impl From<ChatError> for ApiError {
    fn from(error: ChatError) -> Self {
        let status = status_for(&error);
        if status.is_server_error() {
            error!(error = %error, class = error.class_name(), "request failed");
            return Self {
                status,
                message: error.to_string(),
                details: Some(error.class_name().to_string()),
            };
        }

        warn!(error = %error, status = status.as_u16(), "request rejected");
        Self {
            status,
            message: error.to_string(),
            details: None,
        }
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        warn!(error = %rejection.body_text(), "malformed upload");
        Self::bad_request("No file uploaded")
    }
}

impl From<MultipartError> for ApiError {
    fn from(error: MultipartError) -> Self {
        warn!(error = %error.body_text(), "upload stream failed");
        Self {
            status: error.status(),
            message: error.body_text(),
            details: None,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        warn!(error = %rejection.body_text(), "malformed chat request");
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message,
            details: self.details,
        };
        (self.status, Json(body)).into_response()
    }
}
