//! Page geometry lookup
//!
//! The overlay is sized from page 1 only. `/MediaBox` is inheritable, so the
//! lookup walks `/Parent` links up the page tree when a page omits it.

use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::error::WatermarkError;

/// Guard against cyclic `/Parent` chains in damaged files
const MAX_TREE_DEPTH: usize = 64;

/// Largest page side PDF readers are required to support (200 inches)
pub const MAX_PAGE_POINTS: f32 = 14_400.0;

/// Visible page area in PDF points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    /// Points mapped 1:1 onto whole pixels
    pub fn pixel_dimensions(&self) -> (u32, u32) {
        (self.width.round() as u32, self.height.round() as u32)
    }
}

/// Size of the first page of the document
pub fn first_page_size(doc: &Document) -> Result<PageSize, WatermarkError> {
    let first_page = doc
        .get_pages()
        .into_values()
        .next()
        .ok_or(WatermarkError::EmptyDocument)?;
    page_size(doc, first_page)
}

/// Size of a single page, honouring inherited `/MediaBox`
pub fn page_size(doc: &Document, page_id: ObjectId) -> Result<PageSize, WatermarkError> {
    let media_box = inherited_attribute(doc, page_id, b"MediaBox")?
        .ok_or_else(|| WatermarkError::InvalidGeometry("page has no MediaBox".into()))?;

    let coords = resolve(doc, &media_box)
        .as_array()
        .map_err(|_| WatermarkError::InvalidGeometry("MediaBox is not an array".into()))?
        .iter()
        .map(|value| number(resolve(doc, value)))
        .collect::<Option<Vec<f32>>>()
        .ok_or_else(|| WatermarkError::InvalidGeometry("MediaBox has non-numeric entries".into()))?;

    let &[llx, lly, urx, ury] = coords.as_slice() else {
        return Err(WatermarkError::InvalidGeometry(format!(
            "MediaBox has {} entries, expected 4",
            coords.len()
        )));
    };

    let size = PageSize {
        width: (urx - llx).abs(),
        height: (ury - lly).abs(),
    };

    if size.width > MAX_PAGE_POINTS || size.height > MAX_PAGE_POINTS {
        return Err(WatermarkError::InvalidGeometry(format!(
            "page is {}x{} points, limit is {}",
            size.width, size.height, MAX_PAGE_POINTS
        )));
    }

    let (px_width, px_height) = size.pixel_dimensions();
    if px_width == 0 || px_height == 0 {
        return Err(WatermarkError::InvalidGeometry(format!(
            "page is {}x{} points",
            size.width, size.height
        )));
    }

    Ok(size)
}

/// Look up a page attribute, walking up through `/Parent` nodes when absent
pub(crate) fn inherited_attribute(
    doc: &Document,
    page_id: ObjectId,
    key: &[u8],
) -> Result<Option<Object>, WatermarkError> {
    let mut node = dictionary(doc, page_id)?;

    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = node.get(key) {
            return Ok(Some(value.clone()));
        }
        match node.get(b"Parent").and_then(Object::as_reference) {
            Ok(parent_id) => node = dictionary(doc, parent_id)?,
            Err(_) => return Ok(None),
        }
    }

    Ok(None)
}

fn dictionary(doc: &Document, id: ObjectId) -> Result<&Dictionary, WatermarkError> {
    doc.get_dictionary(id)
        .map_err(|e| WatermarkError::PdfParse(format!("object {} {}: {}", id.0, id.1, e)))
}

/// Follow a single indirect reference; anything else is returned as-is
pub(crate) fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        other => other,
    }
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}
