//! Content-type gate for uploads
//!
//! Both checks run before any bytes are parsed. The allow-list lives in
//! [`WatermarkFormat::ALL`] so adding a format never touches the checks.

use crate::error::WatermarkError;

/// The only declared type accepted for the source document
pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Raster formats accepted as a watermark
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatermarkFormat {
    Png,
    Jpeg,
    Webp,
}

impl WatermarkFormat {
    /// Every accepted format, in the order they are reported to clients
    pub const ALL: [WatermarkFormat; 3] = [
        WatermarkFormat::Png,
        WatermarkFormat::Jpeg,
        WatermarkFormat::Webp,
    ];

    pub fn mime_type(&self) -> &'static str {
        match self {
            WatermarkFormat::Png => "image/png",
            WatermarkFormat::Jpeg => "image/jpeg",
            WatermarkFormat::Webp => "image/webp",
        }
    }

    /// Exact match against a declared content type
    pub fn from_mime_type(content_type: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|format| format.mime_type() == content_type)
    }
}

/// Allowed watermark types joined for display, e.g. in error messages
pub fn allowed_watermark_types() -> String {
    WatermarkFormat::ALL
        .iter()
        .map(WatermarkFormat::mime_type)
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn validate_pdf_type(content_type: Option<&str>) -> Result<(), WatermarkError> {
    match content_type {
        Some(PDF_CONTENT_TYPE) => Ok(()),
        _ => Err(WatermarkError::NotAPdf),
    }
}

pub fn validate_watermark_type(
    content_type: Option<&str>,
) -> Result<WatermarkFormat, WatermarkError> {
    content_type
        .and_then(WatermarkFormat::from_mime_type)
        .ok_or(WatermarkError::UnsupportedImageType)
}

/// Check both declared types. The PDF is checked first.
pub fn validate_upload_types(
    pdf_content_type: Option<&str>,
    watermark_content_type: Option<&str>,
) -> Result<WatermarkFormat, WatermarkError> {
    validate_pdf_type(pdf_content_type)?;
    validate_watermark_type(watermark_content_type)
}
