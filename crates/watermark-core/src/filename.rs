//! Download name for the watermarked document

const SUFFIX: &str = "_watermarked.pdf";
const FALLBACK_STEM: &str = "document";

/// `invoice.pdf` -> `invoice_watermarked.pdf`
///
/// Only the last extension is removed. A name whose only dot is the leading
/// one (`.pdf`) has no extension and is kept whole.
pub fn watermarked_filename(original: Option<&str>) -> String {
    let stem = original
        .map(strip_extension)
        .filter(|stem| !stem.is_empty())
        .unwrap_or(FALLBACK_STEM);
    format!("{}{}", stem, SUFFIX)
}

fn strip_extension(name: &str) -> &str {
    // Directory components never contribute an extension
    let base_start = name.rfind(|c: char| c == '/' || c == '\\').map_or(0, |i| i + 1);
    let base = &name[base_start..];

    match base.rfind('.') {
        Some(dot) if base[..dot].chars().any(|c| c != '.') => &name[..base_start + dot],
        _ => name,
    }
}
