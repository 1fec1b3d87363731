//! Conversion entry points.
//!
//! One call converts one PDF into one output folder:
//!
//! 1. validate the input (nothing is created when this fails)
//! 2. construct the LLM backend, only if `use_llm` is set
//! 3. run the extraction engine
//! 4. write the document, images and `meta.json`
//!
//! [`convert`] uses the PDFium engine and the configured LLM backend.
//! [`Converter`] lets callers swap either collaborator or attach a progress
//! callback.

use crate::config::ConversionConfig;
use crate::engine::{EngineServices, ExtractionEngine, PdfiumEngine};
use crate::error::Pdf2MdError;
use crate::llm::{LlmBackend, LlmService};
use crate::output::{save_output, OutputArtifactSet};
use crate::pipeline::input::{document_name, validate_pdf};
use crate::progress::ProgressCallback;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Convert a PDF into `output_dir` with the default PDFium engine.
///
/// `output_dir` is the per-document folder; use [`document_dir`] to derive
/// `<base>/<pdf stem>` the way the CLI does.
///
/// # Errors
/// - `NotFoundError` kind: the PDF is missing or unreadable
/// - `ConversionError` kind: not a PDF, corrupt, encrypted, engine failure
/// - `LLMServiceError` kind: the LLM endpoint failed
/// - `IOError` kind: an output file could not be written
///
/// # Example
/// ```rust,no_run
/// use pdfmark::{convert, document_dir, ConversionConfig};
/// use std::path::Path;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let pdf = Path::new("paper.pdf");
/// let out = document_dir(Path::new("output"), pdf);
/// let artifacts = convert(pdf, &out, &ConversionConfig::default()).await?;
/// println!("{}", artifacts.document.display());
/// # Ok(())
/// # }
/// ```
pub async fn convert(
    pdf_path: impl AsRef<Path>,
    output_dir: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<OutputArtifactSet, Pdf2MdError> {
    Converter::new()
        .convert(pdf_path.as_ref(), output_dir.as_ref(), config)
        .await
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally; do not call from async code.
pub fn convert_sync(
    pdf_path: impl AsRef<Path>,
    output_dir: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<OutputArtifactSet, Pdf2MdError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Pdf2MdError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(pdf_path, output_dir, config))
}

/// `<base>/<file stem of pdf_path>`.
pub fn document_dir(base: &Path, pdf_path: &Path) -> PathBuf {
    base.join(document_name(pdf_path))
}

/// A configured conversion pipeline.
///
/// Cheap to clone; the web server keeps one and shares it across requests.
#[derive(Clone)]
pub struct Converter {
    engine: Arc<dyn ExtractionEngine>,
    llm: Option<Arc<dyn LlmService>>,
    progress: Option<ProgressCallback>,
}

impl Default for Converter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Converter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Converter")
            .field("llm_override", &self.llm.is_some())
            .field("progress", &self.progress.is_some())
            .finish_non_exhaustive()
    }
}

impl Converter {
    /// PDFium engine, LLM backend built from each call's configuration.
    pub fn new() -> Self {
        Self::with_engine(Arc::new(PdfiumEngine))
    }

    pub fn with_engine(engine: Arc<dyn ExtractionEngine>) -> Self {
        Self {
            engine,
            llm: None,
            progress: None,
        }
    }

    /// Use this LLM service instead of building one from the configuration.
    ///
    /// It is still only handed to the engine when `use_llm` is true.
    pub fn with_llm(mut self, llm: Arc<dyn LlmService>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Convert `pdf_path` into `output_dir`.
    pub async fn convert(
        &self,
        pdf_path: &Path,
        output_dir: &Path,
        config: &ConversionConfig,
    ) -> Result<OutputArtifactSet, Pdf2MdError> {
        let start = Instant::now();
        info!("Converting PDF: {}", pdf_path.display());

        validate_pdf(pdf_path)?;

        let llm = if config.use_llm {
            match self.llm {
                Some(ref llm) => Some(Arc::clone(llm)),
                None => Some(Arc::new(LlmBackend::from_config(config)?) as Arc<dyn LlmService>),
            }
        } else {
            debug!("LLM refinement disabled");
            None
        };

        let services = EngineServices {
            llm,
            progress: self.progress.clone(),
        };

        let rendered = self.engine.extract(pdf_path, config, &services).await?;
        let artifacts = save_output(&rendered, output_dir, &document_name(pdf_path)).await?;

        info!(
            "Conversion completed in {:?}: {}",
            start.elapsed(),
            artifacts.directory.display()
        );
        Ok(artifacts)
    }
}
