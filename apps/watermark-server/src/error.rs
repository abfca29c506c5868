//! Error types for the watermark server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use watermark_core::WatermarkError;

/// Detail returned for uploads that declare a valid type but cannot be read
const UNPROCESSABLE_FILE: &str = "Could not process file.";

/// Server error types
#[derive(Error, Debug)]
pub enum ServerError {
    #[error(transparent)]
    Watermark(#[from] WatermarkError),

    #[error("Missing required file part: {0}")]
    MissingPart(&'static str),

    #[error("Invalid multipart request: {0}")]
    Multipart(String),

    #[error("Watermarking timed out after {0}ms")]
    Timeout(u64),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
}

impl ServerError {
    fn status_and_detail(&self) -> (StatusCode, String) {
        match self {
            ServerError::Watermark(err) => match err {
                WatermarkError::NotAPdf
                | WatermarkError::UnsupportedImageType
                | WatermarkError::EmptyDocument
                | WatermarkError::InvalidGeometry(_) => (StatusCode::BAD_REQUEST, err.to_string()),
                WatermarkError::PdfParse(_) | WatermarkError::ImageDecode(_) => {
                    (StatusCode::BAD_REQUEST, UNPROCESSABLE_FILE.to_string())
                }
                WatermarkError::Encode(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to encode watermarked PDF.".to_string(),
                ),
                WatermarkError::Cancelled => (StatusCode::REQUEST_TIMEOUT, err.to_string()),
            },
            ServerError::MissingPart(_) | ServerError::Multipart(_) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            ServerError::Timeout(_) => (StatusCode::REQUEST_TIMEOUT, self.to_string()),
            ServerError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal error".to_string(),
            ),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, detail) = self.status_and_detail();

        if status.is_server_error() {
            tracing::error!("{}", self);
        } else {
            tracing::warn!("Rejected request: {}", self);
        }

        (status, Json(ErrorResponse { detail })).into_response()
    }
}
