//! LLM refinement of one page: the only stage with network I/O.
//!
//! The request carries (in order):
//! 1. **System prompt**: [`DEFAULT_REFINE_PROMPT`] or the configured override
//! 2. **User prompt**: the page's extracted Markdown
//! 3. **Images**: the rasterised page, when available
//!
//! The reply is cleaned with [`clean_markdown`] and parsed back into blocks.
//! Extracted images the model dropped are appended so no figure is lost.
//! Errors propagate unchanged: one failed page fails the conversion.

use crate::config::ConversionConfig;
use crate::error::Pdf2MdError;
use crate::llm::{LlmRequest, LlmService};
use crate::pipeline::blocks::{self, Block};
use crate::pipeline::postprocess::clean_markdown;
use crate::prompts::{refine_user_prompt, DEFAULT_REFINE_PROMPT};
use std::collections::HashSet;
use std::time::Instant;
use tracing::debug;

/// Input for refining a single page.
#[derive(Debug, Clone, Copy)]
pub struct PageInput<'a> {
    /// 1-indexed page number.
    pub page_num: usize,
    /// Number of pages being converted.
    pub total_pages: usize,
    /// Markdown rendered from the heuristic blocks.
    pub markdown: &'a str,
    /// Base64 PNG of the page, if rasterised.
    pub page_image: Option<&'a str>,
    /// Filenames of images extracted from this page.
    pub images: &'a [String],
}

/// Build the request sent for one page.
pub fn build_request(config: &ConversionConfig, page: &PageInput<'_>) -> LlmRequest {
    LlmRequest {
        system: config
            .refine_prompt
            .as_deref()
            .unwrap_or(DEFAULT_REFINE_PROMPT)
            .to_string(),
        prompt: refine_user_prompt(page.page_num, page.total_pages, page.markdown),
        images: page.page_image.map(str::to_string).into_iter().collect(),
    }
}

/// Send one page through the LLM and return its refined blocks.
pub async fn refine_page(
    llm: &dyn LlmService,
    config: &ConversionConfig,
    page: PageInput<'_>,
) -> Result<Vec<Block>, Pdf2MdError> {
    let start = Instant::now();
    let request = build_request(config, &page);

    let reply = llm.complete(&request).await?;
    debug!(
        "Page {}: {} refined {} → {} chars in {:?}",
        page.page_num,
        llm.model(),
        page.markdown.len(),
        reply.len(),
        start.elapsed()
    );

    let cleaned = clean_markdown(&reply, page.images);
    let mut refined = blocks::from_markdown(&cleaned);

    let referenced: HashSet<String> = blocks::image_sources(&refined)
        .map(str::to_string)
        .collect();
    for name in page.images {
        if !referenced.contains(name) {
            refined.push(Block::Image {
                alt: String::new(),
                src: name.clone(),
            });
        }
    }

    Ok(refined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedLlm {
        reply: Result<String, ()>,
        seen: Mutex<Vec<LlmRequest>>,
    }

    #[async_trait]
    impl LlmService for ScriptedLlm {
        fn name(&self) -> &str {
            "scripted"
        }

        fn model(&self) -> &str {
            "scripted-1"
        }

        async fn complete(&self, request: &LlmRequest) -> Result<String, Pdf2MdError> {
            self.seen.lock().unwrap().push(request.clone());
            self.reply.clone().map_err(|_| Pdf2MdError::LlmTimeout {
                service: "scripted".into(),
                secs: 1,
            })
        }
    }

    fn page<'a>(images: &'a [String]) -> PageInput<'a> {
        PageInput {
            page_num: 3,
            total_pages: 4,
            markdown: "RESULTS\n\nraw text",
            page_image: Some("cGFnZQ=="),
            images,
        }
    }

    #[test]
    fn request_uses_prompt_override() {
        let config = ConversionConfig::builder()
            .refine_prompt("Only fix typos.")
            .build()
            .unwrap();
        let req = build_request(&config, &page(&[]));
        assert_eq!(req.system, "Only fix typos.");
        assert!(req.prompt.starts_with("Page 3 of 4."));
        assert_eq!(req.images, vec!["cGFnZQ==".to_string()]);
    }

    #[tokio::test]
    async fn reply_is_cleaned_and_missing_images_restored() {
        let llm = ScriptedLlm {
            reply: Ok("```markdown\n## Results\n\nRaw text.\n![made up](plot.png)\n```".into()),
            seen: Mutex::new(Vec::new()),
        };
        let images = vec!["_page_2_Picture_0.png".to_string()];
        let blocks = refine_page(&llm, &ConversionConfig::default(), page(&images))
            .await
            .unwrap();

        assert_eq!(
            blocks,
            vec![
                Block::Heading {
                    level: 2,
                    text: "Results".into()
                },
                Block::Paragraph {
                    text: "Raw text. *made up*".into()
                },
                Block::Image {
                    alt: String::new(),
                    src: "_page_2_Picture_0.png".into()
                },
            ]
        );
        assert_eq!(llm.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn llm_error_propagates() {
        let llm = ScriptedLlm {
            reply: Err(()),
            seen: Mutex::new(Vec::new()),
        };
        let err = refine_page(&llm, &ConversionConfig::default(), page(&[]))
            .await
            .unwrap_err();
        assert!(matches!(err, Pdf2MdError::LlmTimeout { .. }));
    }
}
