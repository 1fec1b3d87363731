//! Pipeline stages used by [`crate::engine::PdfiumEngine`].
//!
//! Each submodule implements one transformation step.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ blocks ──▶ refine ──▶ blocks ──▶ md / html / json
//! (%PDF)    (pdfium)   (heuristics) (LLM +     (renderers)
//!                                   postprocess)
//! ```
//!
//! 1. [`input`]: check the path exists, is readable and starts with `%PDF`
//! 2. [`render`]: one blocking PDFium pass: text, embedded images, rasters, metadata
//! 3. [`encode`]: PNG and base64 encoding for images and LLM attachments
//! 4. [`blocks`]: text → blocks heuristics, Markdown parser, renderers
//! 5. [`refine`]: per-page LLM call, the only stage with network I/O
//! 6. [`postprocess`]: deterministic cleanup of LLM replies

pub mod blocks;
pub mod encode;
pub mod input;
pub mod postprocess;
pub mod refine;
pub mod render;
