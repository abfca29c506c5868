//! API handlers for the watermark server
//!
//! Provides:
//! - `GET /health`
//! - `POST /watermark/pdf` (multipart: `pdf`, `watermark`)

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Multipart, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{debug, info};
use watermark_core::validate::{validate_pdf_type, validate_watermark_type};
use watermark_core::{
    watermark_pdf_cancellable, watermarked_filename, WatermarkError, PDF_CONTENT_TYPE,
};

use crate::error::ServerError;
use crate::AppState;

/// Multipart part names
const PDF_PART: &str = "pdf";
const WATERMARK_PART: &str = "watermark";

/// Used when the derived name cannot be carried in a header
const FALLBACK_DISPOSITION: &str = "attachment; filename=document_watermarked.pdf";

/// Raises the shared flag when dropped, so a blocking job whose handler has gone
/// away (timeout or client disconnect) stops at its next stage boundary.
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Handler: GET /health
pub async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "watermark-server",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// One uploaded file part
struct Upload {
    file_name: Option<String>,
    data: Bytes,
}

/// Handler: POST /watermark/pdf
///
/// Parts with a disallowed content type are rejected before their body is
/// buffered. The PDF check always wins when both parts are wrong.
pub async fn handle_watermark_pdf(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, ServerError> {
    let mut pdf: Option<Upload> = None;
    let mut watermark: Option<Upload> = None;
    let mut watermark_rejected = false;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::Multipart(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);

        match name.as_str() {
            PDF_PART => {
                validate_pdf_type(content_type.as_deref())?;
            }
            WATERMARK_PART => {
                if validate_watermark_type(content_type.as_deref()).is_err() {
                    watermark_rejected = true;
                    continue;
                }
            }
            other => {
                debug!("Ignoring unexpected multipart field '{}'", other);
                continue;
            }
        }

        let data = field
            .bytes()
            .await
            .map_err(|e| ServerError::Multipart(e.to_string()))?;
        let upload = Upload { file_name, data };

        if name == PDF_PART {
            pdf = Some(upload);
        } else {
            watermark = Some(upload);
        }
    }

    let pdf = pdf.ok_or(ServerError::MissingPart(PDF_PART))?;
    if watermark_rejected {
        return Err(WatermarkError::UnsupportedImageType.into());
    }
    let watermark = watermark.ok_or(ServerError::MissingPart(WATERMARK_PART))?;

    info!(
        "Watermark request: pdf={} ({} bytes), watermark={} bytes",
        pdf.file_name.as_deref().unwrap_or("<unnamed>"),
        pdf.data.len(),
        watermark.data.len()
    );

    let download_name = watermarked_filename(pdf.file_name.as_deref());

    let cancelled = Arc::new(AtomicBool::new(false));
    let _cancel_guard = CancelOnDrop(Arc::clone(&cancelled));

    // Compositing is CPU-bound; keep it off the async workers
    let job = tokio::task::spawn_blocking(move || {
        watermark_pdf_cancellable(&pdf.data, &watermark.data, &cancelled)
    });
    let output = match tokio::time::timeout(Duration::from_millis(state.timeout_ms), job).await {
        Ok(Ok(result)) => result?,
        Ok(Err(join_error)) => {
            return Err(ServerError::Internal(format!(
                "Watermark task panicked: {}",
                join_error
            )));
        }
        Err(_) => {
            debug!("Timed out, cancelling watermark job");
            return Err(ServerError::Timeout(state.timeout_ms));
        }
    };

    info!(
        "Watermarked {} page(s) at {}x{} points -> {} ({} bytes)",
        output.page_count,
        output.page_size.width,
        output.page_size.height,
        download_name,
        output.data.len()
    );

    Ok((
        StatusCode::OK,
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static(PDF_CONTENT_TYPE),
            ),
            (header::CONTENT_DISPOSITION, content_disposition(&download_name)),
        ],
        output.data,
    )
        .into_response())
}

/// `attachment; filename=<name>`, falling back when the name is not a valid header value
fn content_disposition(file_name: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("attachment; filename={}", file_name)).unwrap_or_else(|_| {
        debug!("Filename '{}' not header-safe, using fallback", file_name);
        HeaderValue::from_static(FALLBACK_DISPOSITION)
    })
}
