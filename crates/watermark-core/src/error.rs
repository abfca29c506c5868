use thiserror::Error;

use crate::validate::allowed_watermark_types;

#[derive(Error, Debug)]
pub enum WatermarkError {
    #[error("Uploaded file is not a valid PDF.")]
    NotAPdf,

    #[error("Watermark must be one of: {}", allowed_watermark_types())]
    UnsupportedImageType,

    #[error("Failed to parse PDF: {0}")]
    PdfParse(String),

    #[error("Failed to decode watermark image: {0}")]
    ImageDecode(String),

    #[error("Uploaded PDF has no pages.")]
    EmptyDocument,

    #[error("Invalid page geometry: {0}")]
    InvalidGeometry(String),

    #[error("Failed to encode PDF: {0}")]
    Encode(String),

    #[error("Watermarking was cancelled.")]
    Cancelled,
}

impl WatermarkError {
    /// True when the failure was caused by the uploaded input rather than the server.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, WatermarkError::Encode(_) | WatermarkError::Cancelled)
    }
}
