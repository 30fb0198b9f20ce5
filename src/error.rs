use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Model not loaded. Download kokoro-v1.0.onnx and voices-v1.0.bin first.")]
    ModelNotLoaded,

    #[error("Invalid request body: {0}")]
    InvalidBody(#[from] JsonRejection),

    #[error("{0}")]
    Synthesis(String),

    #[error("WAV encoding failed: {0}")]
    Encoding(#[from] hound::Error),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub detail: String,
    pub code: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AppError::ModelNotLoaded => (StatusCode::SERVICE_UNAVAILABLE, "MODEL_NOT_LOADED"),
            AppError::InvalidBody(rejection) => (rejection.status(), "BAD_REQUEST"),
            AppError::Synthesis(_) => (StatusCode::INTERNAL_SERVER_ERROR, "SYNTHESIS_ERROR"),
            AppError::Encoding(_) => (StatusCode::INTERNAL_SERVER_ERROR, "ENCODING_ERROR"),
        };
        let message = match &self {
            AppError::InvalidBody(rejection) => rejection.body_text(),
            other => other.to_string(),
        };

        if status.is_server_error() {
            tracing::error!("Request failed: {} - {}", code, message);
        } else {
            tracing::warn!("Request rejected: {} - {}", code, message);
        }

        (
            status,
            Json(ErrorResponse {
                detail: message,
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}
