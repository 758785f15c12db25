//! PDF intake forms.
//!
//! - [`fill_form`] projects a record onto the named widgets of an AcroForm template.
//! - [`read_form_values`] reads back the value of every named widget.
//! - [`generate_template`] draws the blank intake form for a locale.
//!
//! Widget names are the record's dotted field paths in the locale's naming
//! (`lifestyle.smoke_tobacco`, `estilo_vida.fuma_tabaco`). Projection is best-effort: a path
//! without a matching widget is skipped, and a widget without a matching path keeps its
//! template default.

mod filler;
mod template;

pub use filler::{fill_form, read_form_values};
pub use template::generate_template;

use crate::error::FormError;
use lopdf::{Document, Object, StringFormat};
use std::fs;
use std::path::{Path, PathBuf};

/// Encodes a PDF text string: literal bytes for ASCII, UTF-16BE with a byte-order mark otherwise.
pub(crate) fn encode_text(text: &str) -> Object {
    if text.is_ascii() {
        return Object::String(text.as_bytes().to_vec(), StringFormat::Literal);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

/// Decodes a PDF text string written as UTF-16BE (with BOM) or single-byte text.
pub(crate) fn decode_text(bytes: &[u8]) -> String {
    match bytes {
        [0xFE, 0xFF, rest @ ..] => {
            let units: Vec<u16> = rest
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        _ => bytes.iter().map(|&b| char::from(b)).collect(),
    }
}

/// Writes `doc` to `path`, creating parent directories, and returns the absolute path.
pub(crate) fn save_document(doc: &mut Document, path: &Path) -> Result<PathBuf, FormError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(FormError::OutputDir)?;
    }

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).map_err(|e| FormError::Save {
        path: path.to_path_buf(),
        source: std::io::Error::other(e.to_string()),
    })?;
    fs::write(path, buffer).map_err(|source| FormError::Save {
        path: path.to_path_buf(),
        source,
    })?;

    path.canonicalize().map_err(FormError::Resolve)
}
