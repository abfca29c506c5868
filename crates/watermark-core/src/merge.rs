//! Overlay merge
//!
//! The algorithm:
//! 1. Flatten the overlay page into a Form XObject (its content, resources and BBox)
//! 2. Copy every object the form reaches into the source document under fresh ids
//! 3. For each source page, in order:
//!    a. Materialise the page's (possibly inherited) resources on the page itself
//!    b. Register the form under an XObject name the page does not already use
//!    c. Wrap the original content in `q ... Q` and draw the form after it
//!
//! The page tree is never touched, so page order and count are preserved.

use std::collections::HashMap;

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use tracing::debug;

use crate::compositor::OverlayPage;
use crate::error::WatermarkError;
use crate::geometry::{inherited_attribute, resolve};

const FORM_NAME_PREFIX: &str = "Wm";

/// Stamp the overlay on top of every page. Returns the number of pages stamped.
pub fn merge_overlay(doc: &mut Document, overlay: &OverlayPage) -> Result<usize, WatermarkError> {
    let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
    if pages.is_empty() {
        return Err(WatermarkError::EmptyDocument);
    }

    let form = overlay_form(overlay)?;
    let form = import_object(doc, overlay.document(), form, &mut HashMap::new());
    let form_id = doc.add_object(form);

    let open_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    let mut close_ids: HashMap<String, ObjectId> = HashMap::new();

    for page_id in &pages {
        let mut resources = page_resources(doc, *page_id)?;
        let mut xobjects = match resources.get(b"XObject") {
            Ok(value) => resolve(doc, value).as_dict().cloned().unwrap_or_default(),
            Err(_) => Dictionary::new(),
        };

        let name = unused_name(&xobjects);
        xobjects.set(name.as_bytes().to_vec(), Object::Reference(form_id));
        resources.set("XObject", Object::Dictionary(xobjects));

        let close_id = *close_ids.entry(name.clone()).or_insert_with(|| {
            let content = format!("\nQ\nq\n/{} Do\nQ\n", name);
            doc.add_object(Stream::new(Dictionary::new(), content.into_bytes()))
        });

        let mut contents = vec![Object::Reference(open_id)];
        contents.extend(
            doc.get_page_contents(*page_id)
                .into_iter()
                .map(Object::Reference),
        );
        contents.push(Object::Reference(close_id));

        let page = doc
            .get_object_mut(*page_id)
            .and_then(Object::as_dict_mut)
            .map_err(|e| WatermarkError::PdfParse(e.to_string()))?;
        page.set("Resources", Object::Dictionary(resources));
        page.set("Contents", Object::Array(contents));

        debug!("Stamped page object {} as /{}", page_id.0, name);
    }

    Ok(pages.len())
}

/// Compress and serialise the document
pub fn save_document(doc: &mut Document) -> Result<Vec<u8>, WatermarkError> {
    doc.compress();

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)
        .map_err(|e| WatermarkError::Encode(format!("Failed to save watermarked PDF: {}", e)))?;

    Ok(buffer)
}

/// The overlay page as a Form XObject, still referring to objects in the overlay document
fn overlay_form(overlay: &OverlayPage) -> Result<Object, WatermarkError> {
    let overlay_doc = overlay.document();
    let page_id = overlay.page_id();

    let mut content = Vec::new();
    for content_id in overlay_doc.get_page_contents(page_id) {
        let stream = overlay_doc
            .get_object(content_id)
            .and_then(Object::as_stream)
            .map_err(|e| WatermarkError::Encode(format!("Overlay content missing: {}", e)))?;
        let bytes = stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone());
        content.extend_from_slice(&bytes);
        content.push(b'\n');
    }

    let resources = inherited_attribute(overlay_doc, page_id, b"Resources")?
        .map(|value| resolve(overlay_doc, &value).clone())
        .unwrap_or_else(|| Object::Dictionary(Dictionary::new()));

    let size = overlay.size();
    let dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Form",
        "BBox" => vec![
            0.into(),
            0.into(),
            Object::Real(size.width),
            Object::Real(size.height),
        ],
        "Resources" => resources,
    };

    Ok(Object::Stream(Stream::new(dict, content)))
}

/// Deep-copy `obj` from `src` into `dest`, giving every referenced object a new id
fn import_object(
    dest: &mut Document,
    src: &Document,
    obj: Object,
    imported: &mut HashMap<ObjectId, ObjectId>,
) -> Object {
    match obj {
        Object::Reference(old_id) => {
            if let Some(new_id) = imported.get(&old_id) {
                return Object::Reference(*new_id);
            }
            let new_id = dest.new_object_id();
            imported.insert(old_id, new_id);

            let target = src.get_object(old_id).cloned().unwrap_or(Object::Null);
            let copied = import_object(dest, src, target, imported);
            dest.objects.insert(new_id, copied);
            Object::Reference(new_id)
        }
        Object::Array(items) => Object::Array(
            items
                .into_iter()
                .map(|item| import_object(dest, src, item, imported))
                .collect(),
        ),
        Object::Dictionary(dict) => {
            Object::Dictionary(import_dictionary(dest, src, &dict, imported))
        }
        Object::Stream(mut stream) => {
            stream.dict = import_dictionary(dest, src, &stream.dict, imported);
            Object::Stream(stream)
        }
        other => other,
    }
}

fn import_dictionary(
    dest: &mut Document,
    src: &Document,
    dict: &Dictionary,
    imported: &mut HashMap<ObjectId, ObjectId>,
) -> Dictionary {
    let mut copied = Dictionary::new();
    for (key, value) in dict.iter() {
        // Never drag the overlay's page tree along
        if key.as_slice() == b"Parent" {
            continue;
        }
        copied.set(key.clone(), import_object(dest, src, value.clone(), imported));
    }
    copied
}

/// The page's resource dictionary as an owned copy, following inheritance
fn page_resources(doc: &Document, page_id: ObjectId) -> Result<Dictionary, WatermarkError> {
    let resources = match inherited_attribute(doc, page_id, b"Resources")? {
        Some(value) => resolve(doc, &value).as_dict().cloned().unwrap_or_default(),
        None => Dictionary::new(),
    };
    Ok(resources)
}

fn unused_name(xobjects: &Dictionary) -> String {
    (0..)
        .map(|n| format!("{}{}", FORM_NAME_PREFIX, n))
        .find(|name| !xobjects.has(name.as_bytes()))
        .unwrap_or_else(|| FORM_NAME_PREFIX.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::compose_overlay;
    use crate::geometry::{first_page_size, page_size};
    use crate::test_support::{create_test_pdf, load, solid_image};
    use image::ImageFormat;
    use pretty_assertions::assert_eq;

    fn red_overlay(doc: &Document) -> OverlayPage {
        let png = solid_image(10, 10, [255, 0, 0, 255], ImageFormat::Png);
        compose_overlay(&png, first_page_size(doc).unwrap()).unwrap()
    }

    fn content_text(doc: &Document, page_id: ObjectId) -> String {
        String::from_utf8_lossy(&doc.get_page_content(page_id).unwrap()).into_owned()
    }

    #[test]
    fn test_merge_preserves_page_count() {
        let mut doc = load(&create_test_pdf(&[(612.0, 792.0); 3]));
        let overlay = red_overlay(&doc);

        let stamped = merge_overlay(&mut doc, &overlay).unwrap();
        assert_eq!(stamped, 3);

        let bytes = save_document(&mut doc).unwrap();
        let reloaded = load(&bytes);
        assert_eq!(reloaded.get_pages().len(), 3);
    }

    #[test]
    fn test_overlay_drawn_after_original_content() {
        let mut doc = load(&create_test_pdf(&[(612.0, 792.0), (612.0, 792.0)]));
        let overlay = red_overlay(&doc);
        merge_overlay(&mut doc, &overlay).unwrap();

        let reloaded = load(&save_document(&mut doc).unwrap());
        for (number, page_id) in reloaded.get_pages() {
            let text = content_text(&reloaded, page_id);
            let original = text
                .find(&format!("(Page-{})", number))
                .expect("original content kept");
            let stamp = text.find("/Wm0 Do").expect("overlay drawn");
            assert!(original < stamp, "overlay must come after page content");
            assert!(text.trim_start().starts_with('q'));
        }
    }

    #[test]
    fn test_page_order_and_size_preserved() {
        let sizes = [(612.0, 792.0), (300.0, 200.0), (842.0, 595.0)];
        let mut doc = load(&create_test_pdf(&sizes));
        let overlay = red_overlay(&doc);
        merge_overlay(&mut doc, &overlay).unwrap();

        let reloaded = load(&save_document(&mut doc).unwrap());
        let pages: Vec<(u32, ObjectId)> = reloaded.get_pages().into_iter().collect();
        for ((number, page_id), (width, height)) in pages.iter().zip(sizes) {
            let size = page_size(&reloaded, *page_id).unwrap();
            assert_eq!((size.width, size.height), (width, height));
            assert!(content_text(&reloaded, *page_id).contains(&format!("(Page-{})", number)));
        }
    }

    #[test]
    fn test_form_registered_in_resources() {
        let mut doc = load(&create_test_pdf(&[(612.0, 792.0)]));
        let overlay = red_overlay(&doc);
        merge_overlay(&mut doc, &overlay).unwrap();

        let page_id = *doc.get_pages().get(&1).unwrap();
        let resources = doc
            .get_dictionary(page_id)
            .unwrap()
            .get(b"Resources")
            .and_then(Object::as_dict)
            .unwrap();
        let form_id = resources
            .get(b"XObject")
            .and_then(Object::as_dict)
            .and_then(|x| x.get(b"Wm0"))
            .and_then(Object::as_reference)
            .unwrap();
        let form = doc.get_object(form_id).and_then(Object::as_stream).unwrap();

        assert_eq!(form.dict.get(b"Subtype").unwrap().as_name().unwrap(), b"Form");
        assert!(form.dict.get(b"Parent").is_err());

        let image_id = form
            .dict
            .get(b"Resources")
            .and_then(Object::as_dict)
            .and_then(|r| r.get(b"XObject"))
            .and_then(Object::as_dict)
            .and_then(|x| x.get(b"WmImage"))
            .and_then(Object::as_reference)
            .unwrap();
        let image = doc.get_object(image_id).and_then(Object::as_stream).unwrap();
        assert!(image.dict.get(b"SMask").is_ok());
    }

    #[test]
    fn test_existing_xobject_name_not_clobbered() {
        let mut doc = load(&create_test_pdf(&[(612.0, 792.0)]));
        let page_id = *doc.get_pages().get(&1).unwrap();
        let existing = doc.add_object(Stream::new(Dictionary::new(), Vec::new()));
        doc.get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .unwrap()
            .set(
                "Resources",
                dictionary! { "XObject" => dictionary! { "Wm0" => existing } },
            );

        let overlay = red_overlay(&doc);
        merge_overlay(&mut doc, &overlay).unwrap();

        let xobjects = doc
            .get_dictionary(page_id)
            .unwrap()
            .get(b"Resources")
            .and_then(Object::as_dict)
            .and_then(|r| r.get(b"XObject"))
            .and_then(Object::as_dict)
            .unwrap();
        assert_eq!(xobjects.get(b"Wm0").unwrap().as_reference().unwrap(), existing);
        assert!(xobjects.has(b"Wm1"));
        assert!(content_text(&doc, page_id).contains("/Wm1 Do"));
    }

    #[test]
    fn test_inherited_resources_are_kept() {
        let mut doc = load(&create_test_pdf(&[(612.0, 792.0)]));
        let page_id = *doc.get_pages().get(&1).unwrap();
        let pages_id = doc
            .get_dictionary(page_id)
            .unwrap()
            .get(b"Parent")
            .and_then(Object::as_reference)
            .unwrap();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        doc.get_object_mut(pages_id)
            .and_then(Object::as_dict_mut)
            .unwrap()
            .set("Resources", dictionary! { "Font" => dictionary! { "F1" => font_id } });

        let overlay = red_overlay(&doc);
        merge_overlay(&mut doc, &overlay).unwrap();

        let resources = doc
            .get_dictionary(page_id)
            .unwrap()
            .get(b"Resources")
            .and_then(Object::as_dict)
            .unwrap();
        let fonts = resources.get(b"Font").and_then(Object::as_dict).unwrap();
        assert_eq!(fonts.get(b"F1").unwrap().as_reference().unwrap(), font_id);
        assert!(resources.get(b"XObject").is_ok());
    }

    #[test]
    fn test_empty_document_rejected() {
        let mut doc = load(&create_test_pdf(&[]));
        let png = solid_image(2, 2, [0, 0, 0, 255], ImageFormat::Png);
        let overlay = compose_overlay(&png, crate::geometry::PageSize { width: 2.0, height: 2.0 })
            .unwrap();
        assert!(matches!(
            merge_overlay(&mut doc, &overlay),
            Err(WatermarkError::EmptyDocument)
        ));
    }
}
