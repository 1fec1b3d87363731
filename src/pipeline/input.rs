//! Input validation: make sure the PDF path is usable before any work starts.
//!
//! Checks run in order: existence, read permission, then the `%PDF` magic
//! bytes. Nothing is created on disk by this stage, so a failed check leaves
//! no trace in the output directory.

use crate::error::Pdf2MdError;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Validate that `path` names a readable file that starts with `%PDF`.
pub fn validate_pdf(path: &Path) -> Result<(), Pdf2MdError> {
    if !path.is_file() {
        return Err(Pdf2MdError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let mut file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(Pdf2MdError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(Pdf2MdError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
    };

    let mut magic = [0u8; 4];
    let read = read_magic(&mut file, &mut magic).map_err(|e| read_error(path, e))?;
    if read < 4 || &magic != b"%PDF" {
        return Err(Pdf2MdError::NotAPdf {
            path: path.to_path_buf(),
            magic,
        });
    }

    debug!("Validated PDF input: {}", path.display());
    Ok(())
}

/// Fill `buf` from the start of `reader`, stopping early only at end of file.
fn read_magic(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn read_error(path: &Path, source: std::io::Error) -> Pdf2MdError {
    if source.kind() == std::io::ErrorKind::PermissionDenied {
        Pdf2MdError::PermissionDenied {
            path: path.to_path_buf(),
        }
    } else {
        Pdf2MdError::conversion(format!("cannot read {}: {}", path.display(), source))
    }
}

/// The document name used for output files: the file stem of `path`.
pub fn document_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "document".to_string())
}
