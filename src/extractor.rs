//! The Text Extractor (§4.D). A closed dispatch table keyed by extension —
//! "tagged variants, not a class hierarchy" (§9) — never raises on an
//! unsupported type; it emits a placeholder instead, so the pipeline still
//! records the file.

use std::path::Path;

pub struct TextExtractor;

impl TextExtractor {
    pub fn extract(path: &Path) -> String {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        match extension_of(path).as_deref() {
            Some("txt") | Some("md") => read_utf8_lossy(path),
            Some("pdf") => extract_pdf(path, &name),
            Some("docx") => extract_docx(path, &name),
            _ => {
                let bytes = match std::fs::read(path) {
                    Ok(bytes) => bytes,
                    Err(_) => return format!("[Binary: {name}]"),
                };
                match String::from_utf8(bytes) {
                    Ok(text) => text,
                    Err(_) => format!("[Binary: {name}]"),
                }
            }
        }
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension().map(|e| e.to_string_lossy().to_lowercase())
}

fn read_utf8_lossy(path: &Path) -> String {
    match std::fs::read(path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(_) => String::new(),
    }
}

/// No PDF parser is bundled (none of the example repos carry one for this
/// purpose); page-wise extraction is a placeholder per §4.D until a real
/// extractor is wired in.
fn extract_pdf(_path: &Path, name: &str) -> String {
    format!("[PDF: {name}]")
}

/// No DOCX parser is bundled either; paragraph-wise extraction is a
/// placeholder per §4.D until a real extractor is wired in.
fn extract_docx(_path: &Path, name: &str) -> String {
    format!("[DOCX: {name}]")
}
