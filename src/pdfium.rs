//! Locating and binding the PDFium shared library.
//!
//! Search order:
//! 1. `PDFIUM_LIB_PATH`, either the library file itself or a directory holding it
//! 2. the current directory
//! 3. the system library paths

use crate::error::Pdf2MdError;
use pdfium_render::prelude::*;
use std::path::PathBuf;
use tracing::debug;

/// Environment variable naming an explicit PDFium library location.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Bind to a PDFium library and return a ready [`Pdfium`] instance.
pub fn bind_pdfium() -> Result<Pdfium, Pdf2MdError> {
    if let Some(path) = explicit_library_path() {
        debug!("Binding PDFium from {}", path.display());
        return Pdfium::bind_to_library(&path)
            .map(Pdfium::new)
            .map_err(|e| Pdf2MdError::PdfiumBindingFailed(format!("{}: {e:?}", path.display())));
    }

    Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
        .map(Pdfium::new)
        .map_err(|e| Pdf2MdError::PdfiumBindingFailed(format!("{e:?}")))
}

/// Resolve `PDFIUM_LIB_PATH` to a library file path, if set.
fn explicit_library_path() -> Option<PathBuf> {
    let raw = std::env::var_os(PDFIUM_LIB_PATH_ENV)?;
    if raw.is_empty() {
        return None;
    }
    let path = PathBuf::from(raw);
    if path.is_dir() {
        Some(Pdfium::pdfium_platform_library_name_at_path(&path))
    } else {
        Some(path)
    }
}
