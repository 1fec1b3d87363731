//! # pdfmark
//!
//! Convert PDF documents into Markdown (or HTML / JSON), extracted images
//! and a metadata file, optionally refining each page through a local or
//! remote LLM.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input    exists, readable, starts with %PDF
//!  ├─ 2. Extract  PDFium text, images, page rasters, metadata (spawn_blocking)
//!  ├─ 3. Blocks   headings, lists, tables, code by line heuristics
//!  ├─ 4. Refine   optional per-page LLM pass (Ollama / OpenAI-compatible)
//!  ├─ 5. Render   markdown | html | json
//!  └─ 6. Output   <dir>/<name>.<ext>, <dir>/<image>.png, <dir>/meta.json
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdfmark::{convert, document_dir, load_config};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config(Some(Path::new("config.json")))?;
//!     let pdf = Path::new("document.pdf");
//!     let artifacts = convert(pdf, document_dir(Path::new("output"), pdf), &config).await?;
//!     println!("Files saved to: {}", artifacts.directory.display());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | The `pdfmark` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `web`   | on      | The [`server`] module and `pdfmark-web` binary (axum) |
//!
//! Disable both when using only the library:
//! ```toml
//! pdfmark = { version = "0.1", default-features = false }
//! ```
//!
//! ## PDFium
//!
//! The engine binds `libpdfium` at runtime: `PDFIUM_LIB_PATH` first, then
//! the current directory, then the system library path.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod engine;
pub mod error;
pub(crate) mod html;
pub mod llm;
pub mod output;
pub mod pdfium;
pub mod pipeline;
pub mod progress;
pub mod prompts;
#[cfg(feature = "web")]
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    load_config, write_default_config, ConversionConfig, ConversionConfigBuilder, LlmServiceKind,
    OutputFormat, PageSelection, PageSeparator,
};
pub use convert::{convert, convert_sync, document_dir, Converter};
pub use engine::{EngineServices, ExtractionEngine, PdfiumEngine};
pub use error::{ErrorKind, Pdf2MdError};
pub use llm::{LlmBackend, LlmRequest, LlmService, OllamaService, OpenAiService};
pub use output::{save_output, OutputArtifactSet, RenderedDocument};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
