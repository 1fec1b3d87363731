//! PDFium stage: open the document once and pull out everything later
//! stages need. That covers page text, embedded images, optional page
//! rasters and document metadata.
//!
//! PDFium is a blocking C library, so the whole pass runs inside
//! `tokio::task::spawn_blocking`. Image encoding happens in the same
//! blocking task so no CPU-heavy work lands on the async workers.
//!
//! Rasters are capped at `max_rendered_pixels` on the longest edge.

use crate::config::ConversionConfig;
use crate::error::Pdf2MdError;
use crate::pdfium::bind_pdfium;
use crate::pipeline::encode::{encode_page_base64, encode_png};
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Embedded images smaller than this on either edge are treated as decoration.
const MIN_IMAGE_EDGE_PX: u32 = 16;

/// Document-level information read from the PDF.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentInfo {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<String>,
    pub modification_date: Option<String>,
    pub pdf_version: String,
    pub page_count: usize,
}

/// Raw material for one selected page.
#[derive(Debug, Clone, Default)]
pub struct ExtractedPage {
    /// 0-indexed page number.
    pub index: usize,
    /// Plain text in PDFium's reading order.
    pub text: String,
    /// Embedded images, PNG-encoded, in object order.
    pub images: Vec<Vec<u8>>,
    /// Base64 PNG raster of the whole page, when requested.
    pub raster: Option<String>,
}

/// Everything extracted from a PDF in one pass.
#[derive(Debug, Clone, Default)]
pub struct ExtractedDocument {
    pub info: DocumentInfo,
    pub pages: Vec<ExtractedPage>,
}

/// Extract the pages selected by `config.page_range`.
///
/// `rasterise` also renders each page to a base64 PNG for the LLM.
pub async fn extract_document(
    pdf_path: &Path,
    config: &ConversionConfig,
    rasterise: bool,
) -> Result<ExtractedDocument, Pdf2MdError> {
    let path = pdf_path.to_path_buf();
    let config = config.clone();

    tokio::task::spawn_blocking(move || extract_document_blocking(&path, &config, rasterise))
        .await
        .map_err(|e| Pdf2MdError::Internal(format!("Extraction task panicked: {}", e)))?
}

fn extract_document_blocking(
    pdf_path: &Path,
    config: &ConversionConfig,
    rasterise: bool,
) -> Result<ExtractedDocument, Pdf2MdError> {
    let pdfium = bind_pdfium()?;
    let password = config.password.as_deref();

    let document = pdfium
        .load_pdf_from_file(pdf_path, password)
        .map_err(|e| open_error(pdf_path, password, e))?;

    let info = read_info(&document);
    info!("PDF loaded: {} pages", info.page_count);

    let indices = config.page_range.to_indices(info.page_count);
    debug!("Selected {} of {} pages", indices.len(), info.page_count);

    let render_config = PdfRenderConfig::new()
        .set_target_width(config.max_rendered_pixels as i32)
        .set_maximum_height(config.max_rendered_pixels as i32);

    let pages = document.pages();
    let mut extracted = Vec::with_capacity(indices.len());

    for idx in indices {
        let page_err = |detail: String| Pdf2MdError::CorruptPdf {
            path: pdf_path.to_path_buf(),
            detail: format!("page {}: {}", idx + 1, detail),
        };

        let page = pages
            .get(page_index(idx)?)
            .map_err(|e| page_err(format!("{e:?}")))?;

        let text = page
            .text()
            .map_err(|e| page_err(format!("text extraction failed: {e:?}")))?
            .all();

        let images = if config.disable_image_extraction {
            Vec::new()
        } else {
            extract_page_images(&page, idx)
        };

        let raster = if rasterise {
            let bitmap = page
                .render_with_config(&render_config)
                .map_err(|e| page_err(format!("rasterisation failed: {e:?}")))?;
            let image = bitmap.as_image();
            debug!(
                "Rendered page {} → {}x{} px",
                idx + 1,
                image.width(),
                image.height()
            );
            Some(
                encode_page_base64(&image)
                    .map_err(|e| page_err(format!("page image encoding failed: {e}")))?,
            )
        } else {
            None
        };

        debug!(
            "Page {}: {} chars of text, {} images",
            idx + 1,
            text.len(),
            images.len()
        );
        extracted.push(ExtractedPage {
            index: idx,
            text,
            images,
            raster,
        });
    }

    Ok(ExtractedDocument {
        info,
        pages: extracted,
    })
}

/// Pull embedded image objects off a page as PNG bytes.
///
/// Images PDFium cannot decode are skipped with a warning.
fn extract_page_images(page: &PdfPage, idx: usize) -> Vec<Vec<u8>> {
    let mut images = Vec::new();
    for object in page.objects().iter() {
        let Some(image_object) = object.as_image_object() else {
            continue;
        };
        let image = match image_object.get_raw_image() {
            Ok(img) => img,
            Err(e) => {
                warn!("Page {}: skipping undecodable image: {:?}", idx + 1, e);
                continue;
            }
        };
        if image.width() < MIN_IMAGE_EDGE_PX || image.height() < MIN_IMAGE_EDGE_PX {
            debug!(
                "Page {}: skipping {}x{} decoration image",
                idx + 1,
                image.width(),
                image.height()
            );
            continue;
        }
        match encode_png(&image) {
            Ok(png) => images.push(png),
            Err(e) => warn!("Page {}: failed to encode image: {}", idx + 1, e),
        }
    }
    images
}

fn read_info(document: &PdfDocument) -> DocumentInfo {
    let metadata = document.metadata();

    let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
        metadata.get(tag).and_then(|t| {
            let v = t.value().trim().to_string();
            if v.is_empty() {
                None
            } else {
                Some(v)
            }
        })
    };

    DocumentInfo {
        title: get_meta(PdfDocumentMetadataTagType::Title),
        author: get_meta(PdfDocumentMetadataTagType::Author),
        subject: get_meta(PdfDocumentMetadataTagType::Subject),
        creator: get_meta(PdfDocumentMetadataTagType::Creator),
        producer: get_meta(PdfDocumentMetadataTagType::Producer),
        creation_date: get_meta(PdfDocumentMetadataTagType::CreationDate),
        modification_date: get_meta(PdfDocumentMetadataTagType::ModificationDate),
        pdf_version: format!("{:?}", document.version()),
        page_count: document.pages().len() as usize,
    }
}

fn open_error(path: &Path, password: Option<&str>, e: PdfiumError) -> Pdf2MdError {
    let path: PathBuf = path.to_path_buf();
    let detail = format!("{:?}", e);
    if detail.contains("Password") || detail.contains("password") {
        if password.is_some() {
            Pdf2MdError::WrongPassword { path }
        } else {
            Pdf2MdError::PasswordRequired { path }
        }
    } else {
        Pdf2MdError::CorruptPdf { path, detail }
    }
}

/// Convert a 0-based page index into PDFium's index type.
fn page_index(idx: usize) -> Result<PdfPageIndex, Pdf2MdError> {
    PdfPageIndex::try_from(idx).map_err(|_| {
        Pdf2MdError::conversion(format!(
            "page {} is beyond the PDFium page index range",
            idx + 1
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn page_index_in_range() {
        assert_eq!(page_index(0).unwrap(), 0);
        assert_eq!(
            page_index(PdfPageIndex::MAX as usize).unwrap(),
            PdfPageIndex::MAX
        );
    }

    #[test]
    fn page_index_out_of_range_is_conversion_error() {
        let err = page_index(PdfPageIndex::MAX as usize + 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conversion);
        assert!(err.to_string().contains("page"));
    }
}
