//! Error types for the pdfmark library.
//!
//! Every fatal failure is a [`Pdf2MdError`]. Front-ends rarely care about the
//! exact variant; they care about which *kind* of failure happened so they can
//! pick an exit code, an HTTP status, or a message prefix. [`ErrorKind`] is
//! that coarse classification:
//!
//! | Kind | Raised when |
//! |------|-------------|
//! | [`ErrorKind::Config`] | configuration file unreadable or malformed, builder validation failed |
//! | [`ErrorKind::NotFound`] | input PDF missing or unreadable |
//! | [`ErrorKind::Conversion`] | extraction engine failed (corrupt PDF, password, pdfium binding) |
//! | [`ErrorKind::LlmService`] | LLM endpoint unreachable, timed out, or returned an error |
//! | [`ErrorKind::Io`] | writing an output artifact or config file failed |
//!
//! Nothing is retried. A conversion that fails after some artifacts were
//! written leaves them on disk.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pdfmark library.
#[derive(Debug, Error)]
pub enum Pdf2MdError {
    // ── Config errors ─────────────────────────────────────────────────────
    /// The configuration file exists but could not be read or parsed.
    #[error("Invalid configuration file '{path}': {reason}")]
    Config { path: PathBuf, reason: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    // ── Extraction errors ─────────────────────────────────────────────────
    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nSet \"password\" in the configuration file.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// The extraction engine failed for any other reason.
    #[error("Conversion failed: {message}")]
    Conversion { message: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Install libpdfium, place it next to the binary, or set\n\
PDFIUM_LIB_PATH=/path/to/libpdfium (file or directory).\n"
    )]
    PdfiumBindingFailed(String),

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The LLM endpoint could not be reached at all.
    #[error("LLM service '{service}' is unreachable at {endpoint}: {reason}\nIs the server running?")]
    LlmUnreachable {
        service: String,
        endpoint: String,
        reason: String,
    },

    /// The LLM call exceeded the configured timeout.
    #[error("LLM service '{service}' timed out after {secs}s")]
    LlmTimeout { service: String, secs: u64 },

    /// The LLM endpoint answered with an error or an unusable body.
    #[error("LLM service '{service}' error: {message}")]
    LlmApiError { service: String, message: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output artifact.
    #[error("Failed to write '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (task panic, runtime construction).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of a [`Pdf2MdError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Config,
    NotFound,
    Conversion,
    LlmService,
    Io,
}

impl Pdf2MdError {
    /// Which failure family this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Pdf2MdError::Config { .. } | Pdf2MdError::InvalidConfig(_) => ErrorKind::Config,
            Pdf2MdError::FileNotFound { .. } | Pdf2MdError::PermissionDenied { .. } => {
                ErrorKind::NotFound
            }
            Pdf2MdError::NotAPdf { .. }
            | Pdf2MdError::CorruptPdf { .. }
            | Pdf2MdError::PasswordRequired { .. }
            | Pdf2MdError::WrongPassword { .. }
            | Pdf2MdError::Conversion { .. }
            | Pdf2MdError::PdfiumBindingFailed(_)
            | Pdf2MdError::Internal(_) => ErrorKind::Conversion,
            Pdf2MdError::LlmUnreachable { .. }
            | Pdf2MdError::LlmTimeout { .. }
            | Pdf2MdError::LlmApiError { .. } => ErrorKind::LlmService,
            Pdf2MdError::OutputWriteFailed { .. } => ErrorKind::Io,
        }
    }

    pub(crate) fn conversion(message: impl Into<String>) -> Self {
        Pdf2MdError::Conversion {
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Config => "ConfigError",
            ErrorKind::NotFound => "NotFoundError",
            ErrorKind::Conversion => "ConversionError",
            ErrorKind::LlmService => "LLMServiceError",
            ErrorKind::Io => "IOError",
        };
        f.write_str(s)
    }
}
