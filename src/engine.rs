//! Extraction engines: turn a PDF into a [`RenderedDocument`].
//!
//! [`ExtractionEngine`] is the seam between the orchestrator and whatever
//! does the actual PDF work. The crate ships [`PdfiumEngine`]; tests and
//! embedders can plug in their own.

use crate::config::{ConversionConfig, OutputFormat};
use crate::error::Pdf2MdError;
use crate::llm::LlmService;
use crate::output::RenderedDocument;
use crate::pipeline::blocks::{self, Block, PageBlocks};
use crate::pipeline::refine::{refine_page, PageInput};
use crate::pipeline::render::{extract_document, DocumentInfo};
use crate::progress::ProgressCallback;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Collaborators handed to an engine for one conversion.
#[derive(Clone, Default)]
pub struct EngineServices {
    /// Present only when the configuration asks for LLM refinement.
    pub llm: Option<Arc<dyn LlmService>>,
    pub progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for EngineServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineServices")
            .field("llm", &self.llm.as_ref().map(|l| format!("{}:{}", l.name(), l.model())))
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// Something that can extract a PDF into rendered text, images and metadata.
#[async_trait]
pub trait ExtractionEngine: Send + Sync {
    async fn extract(
        &self,
        pdf_path: &Path,
        config: &ConversionConfig,
        services: &EngineServices,
    ) -> Result<RenderedDocument, Pdf2MdError>;
}

/// The PDFium-backed engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfiumEngine;

/// Per-page counters reported in `meta.json`.
#[derive(Debug, Clone, Copy, Default)]
struct PageStat {
    page: usize,
    blocks: usize,
    images: usize,
    refined: bool,
}

#[async_trait]
impl ExtractionEngine for PdfiumEngine {
    async fn extract(
        &self,
        pdf_path: &Path,
        config: &ConversionConfig,
        services: &EngineServices,
    ) -> Result<RenderedDocument, Pdf2MdError> {
        let start = Instant::now();
        let rasterise = services.llm.is_some() && config.llm_page_images;
        let extracted = extract_document(pdf_path, config, rasterise).await?;

        let total = extracted.pages.len();
        if total == 0 {
            return Err(Pdf2MdError::conversion(format!(
                "page selection '{}' matches none of the {} pages",
                config.page_range, extracted.info.page_count
            )));
        }

        if let Some(ref cb) = services.progress {
            cb.on_conversion_start(total);
        }

        let mut images: BTreeMap<String, Vec<u8>> = BTreeMap::new();
        let mut pages: Vec<PageBlocks> = Vec::with_capacity(total);
        let mut stats: Vec<PageStat> = Vec::with_capacity(total);

        for page in extracted.pages {
            let page_num = page.index + 1;
            if let Some(ref cb) = services.progress {
                cb.on_page_start(page_num, total);
            }

            let mut page_blocks = blocks::from_text(&page.text);
            let mut names = Vec::with_capacity(page.images.len());
            for (i, png) in page.images.into_iter().enumerate() {
                let name = image_file_name(page.index, i);
                page_blocks.push(Block::Image {
                    alt: String::new(),
                    src: name.clone(),
                });
                images.insert(name.clone(), png);
                names.push(name);
            }

            let mut refined = false;
            if let Some(ref llm) = services.llm {
                let markdown = blocks::to_markdown(&page_blocks);
                let input = PageInput {
                    page_num,
                    total_pages: total,
                    markdown: &markdown,
                    page_image: page.raster.as_deref(),
                    images: &names,
                };
                match refine_page(llm.as_ref(), config, input).await {
                    Ok(b) => {
                        page_blocks = b;
                        refined = true;
                    }
                    Err(e) => {
                        if let Some(ref cb) = services.progress {
                            cb.on_page_error(page_num, total, &e.to_string());
                        }
                        return Err(e);
                    }
                }
            }

            let page_blocks = PageBlocks::new(page_num, page_blocks);
            if let Some(ref cb) = services.progress {
                let len = blocks::to_markdown(&page_blocks.blocks).len();
                cb.on_page_complete(page_num, total, len);
            }
            debug!(
                "Page {}: {} blocks, {} images, refined={}",
                page_num,
                page_blocks.blocks.len(),
                names.len(),
                refined
            );
            stats.push(PageStat {
                page: page_num,
                blocks: page_blocks.blocks.len(),
                images: names.len(),
                refined,
            });
            pages.push(page_blocks);
        }

        let title = extracted
            .info
            .title
            .clone()
            .unwrap_or_else(|| crate::pipeline::input::document_name(pdf_path));
        let text = match config.output_format {
            OutputFormat::Markdown => blocks::render_markdown(&pages, &config.page_separator),
            OutputFormat::Html => blocks::render_html(&title, &pages),
            OutputFormat::Json => blocks::render_json(&pages)
                .map_err(|e| Pdf2MdError::conversion(format!("JSON rendering failed: {e}")))?,
        };

        let metadata = build_metadata(
            &extracted.info,
            config,
            services.llm.as_deref(),
            &pages,
            &stats,
            images.len(),
        );

        if let Some(ref cb) = services.progress {
            cb.on_conversion_complete(total, total);
        }
        info!(
            "Extracted {} pages ({} images) in {:?}",
            total,
            images.len(),
            start.elapsed()
        );

        Ok(RenderedDocument {
            text,
            format: config.output_format,
            images,
            metadata,
        })
    }
}

/// Filename for the `i`-th image on the 0-indexed page `page_index`.
pub fn image_file_name(page_index: usize, i: usize) -> String {
    format!("_page_{}_Picture_{}.png", page_index, i)
}

fn build_metadata(
    info: &DocumentInfo,
    config: &ConversionConfig,
    llm: Option<&dyn LlmService>,
    pages: &[PageBlocks],
    stats: &[PageStat],
    image_count: usize,
) -> Map<String, Value> {
    let toc: Vec<Value> = pages
        .iter()
        .flat_map(|p| {
            p.blocks.iter().filter_map(move |b| match b {
                Block::Heading { level, text } => Some(json!({
                    "title": text,
                    "level": level,
                    "page": p.page,
                })),
                _ => None,
            })
        })
        .collect();

    let page_stats: Vec<Value> = stats
        .iter()
        .map(|s| {
            json!({
                "page": s.page,
                "blocks": s.blocks,
                "images": s.images,
                "llm_refined": s.refined,
            })
        })
        .collect();

    let mut meta = Map::new();
    meta.insert("title".into(), json!(info.title));
    meta.insert("author".into(), json!(info.author));
    meta.insert("subject".into(), json!(info.subject));
    meta.insert("creator".into(), json!(info.creator));
    meta.insert("producer".into(), json!(info.producer));
    meta.insert("creation_date".into(), json!(info.creation_date));
    meta.insert("modification_date".into(), json!(info.modification_date));
    meta.insert("pdf_version".into(), json!(info.pdf_version));
    meta.insert("pages".into(), json!(info.page_count));
    meta.insert("pages_converted".into(), json!(pages.len()));
    meta.insert("images".into(), json!(image_count));
    meta.insert("output_format".into(), json!(config.output_format.as_str()));
    meta.insert(
        "llm".into(),
        match llm {
            Some(l) => json!({ "service": l.name(), "model": l.model() }),
            None => Value::Null,
        },
    );
    meta.insert("table_of_contents".into(), Value::Array(toc));
    meta.insert("page_stats".into(), Value::Array(page_stats));
    meta
}
