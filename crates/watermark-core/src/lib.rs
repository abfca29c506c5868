//! PDF watermarking
//!
//! Overlays a translucent raster image on every page of a PDF using lopdf.
//!
//! The work happens in four stages, each in its own module:
//! - [`validate`]: declared content types against the allow-lists
//! - [`geometry`]: size of the source's first page
//! - [`compositor`]: watermark stretched, faded to 30% and laid out as a one-page overlay
//! - [`merge`]: overlay stamped on top of each page, output serialised
//!
//! [`watermark_pdf`] runs the last three in order. Validation is a separate
//! call so hosts can reject uploads before reading or parsing them.

pub mod compositor;
pub mod error;
pub mod filename;
pub mod geometry;
pub mod merge;
pub mod validate;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::atomic::{AtomicBool, Ordering};

use lopdf::Document;
use tracing::debug;

pub use compositor::{build_overlay, compose_overlay, prepare_watermark, scale_alpha, OverlayPage};
pub use error::WatermarkError;
pub use filename::watermarked_filename;
pub use geometry::{first_page_size, PageSize, MAX_PAGE_POINTS};
pub use merge::{merge_overlay, save_document};
pub use validate::{
    allowed_watermark_types, validate_upload_types, WatermarkFormat, PDF_CONTENT_TYPE,
};

/// A finished watermarked document
#[derive(Debug, Clone)]
pub struct WatermarkedPdf {
    /// Serialised PDF bytes
    pub data: Vec<u8>,
    pub page_count: usize,
    /// Size of the source's first page, which the overlay was built for
    pub page_size: PageSize,
}

/// Stamp `image_bytes` onto every page of `pdf_bytes`
pub fn watermark_pdf(
    pdf_bytes: &[u8],
    image_bytes: &[u8],
) -> Result<WatermarkedPdf, WatermarkError> {
    watermark_pdf_cancellable(pdf_bytes, image_bytes, &AtomicBool::new(false))
}

/// [`watermark_pdf`] that stops at the next stage boundary once `cancelled` is set.
///
/// Everything built so far is dropped before returning [`WatermarkError::Cancelled`].
pub fn watermark_pdf_cancellable(
    pdf_bytes: &[u8],
    image_bytes: &[u8],
    cancelled: &AtomicBool,
) -> Result<WatermarkedPdf, WatermarkError> {
    let check = || {
        if cancelled.load(Ordering::Relaxed) {
            debug!("Watermark job cancelled");
            Err(WatermarkError::Cancelled)
        } else {
            Ok(())
        }
    };

    check()?;
    let mut doc =
        Document::load_mem(pdf_bytes).map_err(|e| WatermarkError::PdfParse(e.to_string()))?;

    let page_size = first_page_size(&doc)?;
    debug!(
        "Source page size {}x{} points",
        page_size.width, page_size.height
    );

    check()?;
    let overlay = compose_overlay(image_bytes, page_size)?;

    check()?;
    let page_count = merge_overlay(&mut doc, &overlay)?;
    drop(overlay);

    check()?;
    let data = save_document(&mut doc)?;

    Ok(WatermarkedPdf {
        data,
        page_count,
        page_size,
    })
}

/// Parse PDF bytes and return page count
pub fn get_page_count(bytes: &[u8]) -> Result<usize, WatermarkError> {
    let doc = Document::load_mem(bytes).map_err(|e| WatermarkError::PdfParse(e.to_string()))?;
    Ok(doc.get_pages().len())
}
