//! Watermark compositing
//!
//! Turns raw watermark bytes into a single-page overlay document:
//! 1. Decode (format sniffed from content)
//! 2. Stretch to the page's pixel size, ignoring aspect ratio
//! 3. Normalise to RGBA8
//! 4. Scale every alpha sample to 30%
//! 5. Embed as an image XObject with a soft mask on a page of the same size

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::imageops::FilterType;
use image::RgbaImage;
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use tracing::debug;

use crate::error::WatermarkError;
use crate::geometry::PageSize;

/// Fixed opacity as a fraction `OPACITY_NUMERATOR / OPACITY_DENOMINATOR`
pub const OPACITY_NUMERATOR: u16 = 3;
pub const OPACITY_DENOMINATOR: u16 = 10;

/// Resource name of the watermark image inside the overlay page
pub(crate) const IMAGE_RESOURCE_NAME: &str = "WmImage";

/// `floor(alpha * 0.3)`, computed exactly
pub fn scale_alpha(alpha: u8) -> u8 {
    (alpha as u16 * OPACITY_NUMERATOR / OPACITY_DENOMINATOR) as u8
}

/// Decode, stretch to the page and fade the watermark
pub fn prepare_watermark(image_bytes: &[u8], size: PageSize) -> Result<RgbaImage, WatermarkError> {
    let decoded = image::load_from_memory(image_bytes)
        .map_err(|e| WatermarkError::ImageDecode(e.to_string()))?;

    let (width, height) = size.pixel_dimensions();
    debug!(
        "Resizing watermark from {}x{} to {}x{}",
        decoded.width(),
        decoded.height(),
        width,
        height
    );

    let mut rgba = decoded
        .resize_exact(width, height, FilterType::CatmullRom)
        .to_rgba8();

    for pixel in rgba.pixels_mut() {
        pixel.0[3] = scale_alpha(pixel.0[3]);
    }

    Ok(rgba)
}

/// A one-page document holding the faded watermark, sized to the source's first page
#[derive(Debug)]
pub struct OverlayPage {
    document: Document,
    page_id: ObjectId,
    size: PageSize,
}

impl OverlayPage {
    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn page_id(&self) -> ObjectId {
        self.page_id
    }

    pub fn size(&self) -> PageSize {
        self.size
    }

    pub fn page_count(&self) -> usize {
        self.document.get_pages().len()
    }

    /// Serialise the overlay as a standalone PDF
    pub fn to_bytes(&self) -> Result<Vec<u8>, WatermarkError> {
        let mut document = self.document.clone();
        let mut buffer = Vec::new();
        document
            .save_to(&mut buffer)
            .map_err(|e| WatermarkError::Encode(e.to_string()))?;
        Ok(buffer)
    }
}

/// Decode the watermark and lay it out as an overlay page in one step
pub fn compose_overlay(image_bytes: &[u8], size: PageSize) -> Result<OverlayPage, WatermarkError> {
    let image = prepare_watermark(image_bytes, size)?;
    build_overlay(&image, size)
}

/// Embed a prepared RGBA image as a full-page overlay
pub fn build_overlay(image: &RgbaImage, size: PageSize) -> Result<OverlayPage, WatermarkError> {
    let (width, height) = image.dimensions();
    let pixel_count = width as usize * height as usize;

    let mut rgb_data = Vec::with_capacity(pixel_count * 3);
    let mut alpha_data = Vec::with_capacity(pixel_count);
    for chunk in image.as_raw().chunks_exact(4) {
        rgb_data.extend_from_slice(&chunk[..3]);
        alpha_data.push(chunk[3]);
    }

    let mut doc = Document::with_version("1.5");

    let smask_id = doc.add_object(image_stream(width, height, "DeviceGray", &alpha_data)?);

    let mut image_xobject = image_stream(width, height, "DeviceRGB", &rgb_data)?;
    image_xobject.dict.set("SMask", Object::Reference(smask_id));
    let image_id = doc.add_object(image_xobject);

    // Unit square scaled to the full page
    let content = format!(
        "q\n{} 0 0 {} 0 0 cm\n/{} Do\nQ\n",
        size.width, size.height, IMAGE_RESOURCE_NAME
    );
    let content_id = doc.add_object(Stream::new(Dictionary::new(), content.into_bytes()));

    let pages_id = doc.new_object_id();
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![
            0.into(),
            0.into(),
            Object::Real(size.width),
            Object::Real(size.height),
        ],
        "Resources" => dictionary! {
            "XObject" => dictionary! {
                IMAGE_RESOURCE_NAME => image_id,
            },
        },
        "Contents" => content_id,
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    Ok(OverlayPage {
        document: doc,
        page_id,
        size,
    })
}

/// Flate-compressed 8-bit image XObject
fn image_stream(
    width: u32,
    height: u32,
    color_space: &str,
    samples: &[u8],
) -> Result<Stream, WatermarkError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(samples)
        .map_err(|e| WatermarkError::Encode(format!("Failed to compress image data: {}", e)))?;
    let compressed = encoder
        .finish()
        .map_err(|e| WatermarkError::Encode(format!("Failed to finish compression: {}", e)))?;

    let dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width as i64,
        "Height" => height as i64,
        "ColorSpace" => Object::Name(color_space.as_bytes().to_vec()),
        "BitsPerComponent" => 8,
        "Filter" => "FlateDecode",
    };

    // Content is already encoded; keep lopdf from compressing it again on save
    Ok(Stream::new(dict, compressed).with_compression(false))
}
