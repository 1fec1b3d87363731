//! Configuration types and the JSON configuration loader.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`]. The
//! value is built once (defaults, merged with an optional JSON file) and then
//! passed by reference to every call; nothing mutates it afterwards. Callers
//! that need per-request variations (the web form) derive a *new* value with
//! [`ConversionConfig::to_builder`].
//!
//! # File format
//!
//! A flat JSON object. Every key is optional; missing keys take the defaults
//! below and unknown keys are kept in [`ConversionConfig::extra`] and written
//! back untouched.
//!
//! ```json
//! {
//!     "output_format": "markdown",
//!     "use_llm": true,
//!     "llm_service": "ollama",
//!     "ollama_base_url": "http://localhost:11434",
//!     "ollama_model": "qwen2.5:14b"
//! }
//! ```

use crate::error::Pdf2MdError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Configuration for one PDF conversion.
///
/// Built via [`ConversionConfig::builder()`], [`ConversionConfig::default()`]
/// or [`load_config`].
///
/// # Example
/// ```rust
/// use pdfmark::{ConversionConfig, LlmServiceKind, OutputFormat};
///
/// let config = ConversionConfig::builder()
///     .output_format(OutputFormat::Markdown)
///     .llm_service(LlmServiceKind::Ollama)
///     .ollama_model("llama3:8b")
///     .build()
///     .unwrap();
/// assert!(config.use_llm);
/// ```
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionConfig {
    /// Rendered document format. Default: markdown.
    #[serde(default)]
    pub output_format: OutputFormat,

    /// Refine extracted text through the LLM service. Default: true.
    ///
    /// When false no LLM backend is constructed and no endpoint is contacted.
    #[serde(default = "default_use_llm")]
    pub use_llm: bool,

    /// Which LLM backend to talk to. Default: ollama.
    #[serde(default)]
    pub llm_service: LlmServiceKind,

    /// Base URL of the Ollama server.
    #[serde(default = "default_ollama_base_url")]
    pub ollama_base_url: String,

    /// Ollama model tag, e.g. "qwen2.5:14b".
    #[serde(default = "default_ollama_model")]
    pub ollama_model: String,

    /// Base URL of an OpenAI-compatible API, including the version segment.
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,

    /// Model name for the OpenAI-compatible backend.
    #[serde(default = "default_openai_model")]
    pub openai_model: String,

    /// API key for the OpenAI-compatible backend. Falls back to `OPENAI_API_KEY`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai_api_key: Option<String>,

    /// Per-request timeout for LLM calls, in seconds. Default: 120.
    ///
    /// Local models on CPU can take well over a minute for a dense page.
    #[serde(default = "default_llm_timeout_secs")]
    pub llm_timeout_secs: u64,

    /// Sampling temperature. Default: 0.1.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens the LLM may generate per page. Default: 4096.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Custom refinement prompt. If None, uses [`crate::prompts::DEFAULT_REFINE_PROMPT`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refine_prompt: Option<String>,

    /// Attach the rasterised page image to each LLM request. Default: true.
    #[serde(default = "default_llm_page_images")]
    pub llm_page_images: bool,

    /// Longest edge of a rasterised page, in pixels. Default: 2000.
    #[serde(default = "default_max_rendered_pixels")]
    pub max_rendered_pixels: u32,

    /// Pages to convert. Default: all.
    #[serde(default)]
    pub page_range: PageSelection,

    /// Separator inserted between pages of the rendered Markdown. Default: none.
    #[serde(default)]
    pub page_separator: PageSeparator,

    /// Skip embedded-image extraction. Default: false.
    #[serde(default)]
    pub disable_image_extraction: bool,

    /// PDF user password for encrypted documents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Keys this crate does not recognise, preserved as-is.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_use_llm() -> bool {
    true
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "qwen2.5:14b".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_llm_timeout_secs() -> u64 {
    120
}

fn default_temperature() -> f32 {
    0.1
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_llm_page_images() -> bool {
    true
}

fn default_max_rendered_pixels() -> u32 {
    2000
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            output_format: OutputFormat::default(),
            use_llm: default_use_llm(),
            llm_service: LlmServiceKind::default(),
            ollama_base_url: default_ollama_base_url(),
            ollama_model: default_ollama_model(),
            openai_base_url: default_openai_base_url(),
            openai_model: default_openai_model(),
            openai_api_key: None,
            llm_timeout_secs: default_llm_timeout_secs(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            refine_prompt: None,
            llm_page_images: default_llm_page_images(),
            max_rendered_pixels: default_max_rendered_pixels(),
            page_range: PageSelection::default(),
            page_separator: PageSeparator::default(),
            disable_image_extraction: false,
            password: None,
            extra: Map::new(),
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("output_format", &self.output_format)
            .field("use_llm", &self.use_llm)
            .field("llm_service", &self.llm_service)
            .field("ollama_base_url", &self.ollama_base_url)
            .field("ollama_model", &self.ollama_model)
            .field("openai_base_url", &self.openai_base_url)
            .field("openai_model", &self.openai_model)
            .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| "<redacted>"))
            .field("llm_timeout_secs", &self.llm_timeout_secs)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("refine_prompt", &self.refine_prompt)
            .field("llm_page_images", &self.llm_page_images)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("page_range", &self.page_range)
            .field("page_separator", &self.page_separator)
            .field("disable_image_extraction", &self.disable_image_extraction)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("extra", &self.extra)
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder starting from the defaults.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Create a builder seeded with a copy of this configuration.
    pub fn to_builder(&self) -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: self.clone(),
        }
    }

    /// Base URL of the selected LLM backend.
    pub fn llm_base_url(&self) -> &str {
        match self.llm_service {
            LlmServiceKind::Ollama => &self.ollama_base_url,
            LlmServiceKind::OpenAi => &self.openai_base_url,
        }
    }

    /// Model name of the selected LLM backend.
    pub fn llm_model(&self) -> &str {
        match self.llm_service {
            LlmServiceKind::Ollama => &self.ollama_model,
            LlmServiceKind::OpenAi => &self.openai_model,
        }
    }

    /// Check cross-field constraints; returns a human-readable reason on failure.
    pub fn validate(&self) -> Result<(), String> {
        check_http_url("ollama_base_url", &self.ollama_base_url)?;
        check_http_url("openai_base_url", &self.openai_base_url)?;
        if self.ollama_model.trim().is_empty() {
            return Err("ollama_model must not be empty".into());
        }
        if self.openai_model.trim().is_empty() {
            return Err("openai_model must not be empty".into());
        }
        if self.llm_timeout_secs == 0 {
            return Err("llm_timeout_secs must be ≥ 1".into());
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(format!("temperature must be 0–2, got {}", self.temperature));
        }
        if self.max_tokens == 0 {
            return Err("max_tokens must be ≥ 1".into());
        }
        if self.max_rendered_pixels < 100 {
            return Err(format!(
                "max_rendered_pixels must be ≥ 100, got {}",
                self.max_rendered_pixels
            ));
        }
        Ok(())
    }
}

fn check_http_url(field: &str, value: &str) -> Result<(), String> {
    let url = reqwest::Url::parse(value).map_err(|e| format!("{field} '{value}': {e}"))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(format!("{field} must be http or https, got '{other}'")),
    }
}

// ── Loader ───────────────────────────────────────────────────────────────

/// Load a configuration file, merging it over the defaults.
///
/// * `None` → defaults.
/// * A path that does not exist → defaults, with a warning. This keeps
///   `load_config(Some(missing)) == load_config(None)`.
/// * A path that exists but cannot be read, is not a JSON object, has a
///   wrongly typed key, or fails validation → [`Pdf2MdError::Config`].
pub fn load_config(path: Option<&Path>) -> Result<ConversionConfig, Pdf2MdError> {
    let Some(path) = path else {
        debug!("No config file provided, using default configuration");
        return Ok(ConversionConfig::default());
    };

    if !path.exists() {
        warn!(
            "Configuration file '{}' not found, using default configuration",
            path.display()
        );
        return Ok(ConversionConfig::default());
    }

    let config_error = |reason: String| Pdf2MdError::Config {
        path: path.to_path_buf(),
        reason,
    };

    let raw = std::fs::read_to_string(path).map_err(|e| config_error(e.to_string()))?;
    let config: ConversionConfig =
        serde_json::from_str(&raw).map_err(|e| config_error(e.to_string()))?;
    config.validate().map_err(config_error)?;

    if !config.extra.is_empty() {
        debug!(
            "Passing through unrecognised config keys: {:?}",
            config.extra.keys().collect::<Vec<_>>()
        );
    }
    info!("Configuration loaded from {}", path.display());
    Ok(config)
}

/// Write the default configuration to `path` as pretty-printed JSON.
///
/// Parent directories are created. An existing file is overwritten.
pub fn write_default_config(path: &Path) -> Result<(), Pdf2MdError> {
    let write_error = |source: std::io::Error| Pdf2MdError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(write_error)?;
    }

    let mut json = serde_json::to_string_pretty(&ConversionConfig::default())
        .map_err(|e| Pdf2MdError::Internal(format!("serialise default config: {e}")))?;
    json.push('\n');

    std::fs::write(path, json).map_err(write_error)?;
    info!("Default configuration created at: {}", path.display());
    Ok(())
}

// ── Builder ──────────────────────────────────────────────────────────────

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.config.output_format = format;
        self
    }

    pub fn use_llm(mut self, v: bool) -> Self {
        self.config.use_llm = v;
        self
    }

    pub fn llm_service(mut self, kind: LlmServiceKind) -> Self {
        self.config.llm_service = kind;
        self
    }

    pub fn ollama_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.ollama_base_url = url.into();
        self
    }

    pub fn ollama_model(mut self, model: impl Into<String>) -> Self {
        self.config.ollama_model = model.into();
        self
    }

    pub fn openai_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.openai_base_url = url.into();
        self
    }

    pub fn openai_model(mut self, model: impl Into<String>) -> Self {
        self.config.openai_model = model.into();
        self
    }

    pub fn openai_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.openai_api_key = Some(key.into());
        self
    }

    /// Set the model of whichever backend is currently selected.
    pub fn llm_model(self, model: impl Into<String>) -> Self {
        match self.config.llm_service {
            LlmServiceKind::Ollama => self.ollama_model(model),
            LlmServiceKind::OpenAi => self.openai_model(model),
        }
    }

    pub fn llm_timeout_secs(mut self, secs: u64) -> Self {
        self.config.llm_timeout_secs = secs.max(1);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: u32) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn refine_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.refine_prompt = Some(prompt.into());
        self
    }

    pub fn llm_page_images(mut self, v: bool) -> Self {
        self.config.llm_page_images = v;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.page_range = selection;
        self
    }

    pub fn page_separator(mut self, sep: PageSeparator) -> Self {
        self.config.page_separator = sep;
        self
    }

    pub fn disable_image_extraction(mut self, v: bool) -> Self {
        self.config.disable_image_extraction = v;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    /// Set a pass-through key that this crate does not interpret.
    pub fn extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config.extra.insert(key.into(), value);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Pdf2MdError> {
        self.config.validate().map_err(Pdf2MdError::InvalidConfig)?;
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Format of the rendered document written next to the images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// GitHub-flavoured Markdown, `<name>.md`. (default)
    #[default]
    Markdown,
    /// Standalone HTML page, `<name>.html`.
    Html,
    /// JSON block tree, `<name>.json`.
    Json,
}

impl OutputFormat {
    /// File extension of the rendered document.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Markdown => "md",
            OutputFormat::Html => "html",
            OutputFormat::Json => "json",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Markdown => "markdown",
            OutputFormat::Html => "html",
            OutputFormat::Json => "json",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            "html" => Ok(OutputFormat::Html),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!(
                "unknown output format '{other}' (expected markdown, html or json)"
            )),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supported LLM backends.
///
/// Selected by the `llm_service` key. The dotted class paths used by older
/// configuration files are accepted as aliases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LlmServiceKind {
    /// Ollama `/api/generate`. (default)
    #[default]
    #[serde(rename = "ollama", alias = "marker.services.ollama.OllamaService")]
    Ollama,
    /// Any OpenAI-compatible `/chat/completions` endpoint.
    #[serde(rename = "openai", alias = "marker.services.openai.OpenAIService")]
    OpenAi,
}

impl LlmServiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmServiceKind::Ollama => "ollama",
            LlmServiceKind::OpenAi => "openai",
        }
    }
}

impl FromStr for LlmServiceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "ollama" | "marker.services.ollama.OllamaService" => Ok(LlmServiceKind::Ollama),
            "openai" | "marker.services.openai.OpenAIService" => Ok(LlmServiceKind::OpenAi),
            other => Err(format!(
                "unknown llm_service '{other}' (expected ollama or openai)"
            )),
        }
    }
}

impl fmt::Display for LlmServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Specifies which pages of the PDF to convert.
///
/// Serialised as the same compact string the CLI accepts: `all`, `5`,
/// `3-15`, or `1,3,5,7` (1-indexed).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PageSelection {
    /// Convert all pages (default).
    #[default]
    All,
    /// Convert a single page (1-indexed).
    Single(usize),
    /// Convert a contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Convert specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 0-indexed page numbers.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) => {
                if *p >= 1 && *p <= total_pages {
                    vec![p - 1]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => {
                let s = (*start).max(1) - 1;
                let e = (*end).min(total_pages);
                (s..e).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .filter(|&&p| p >= 1 && p <= total_pages)
                .map(|p| p - 1)
                .collect(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}

impl FromStr for PageSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();

        if s.is_empty() || s == "all" {
            return Ok(PageSelection::All);
        }

        let parse_page = |p: &str| -> Result<usize, String> {
            let page: usize = p
                .trim()
                .parse()
                .map_err(|_| format!("invalid page number '{}'", p.trim()))?;
            if page < 1 {
                return Err(format!("pages are 1-indexed, minimum is 1 (got {page})"));
            }
            Ok(page)
        };

        // Range: "3-15"
        if let Some((start, end)) = s.split_once('-') {
            let start = parse_page(start)?;
            let end = parse_page(end)?;
            if start > end {
                return Err(format!(
                    "invalid page range '{start}-{end}': start must be <= end"
                ));
            }
            return Ok(PageSelection::Range(start, end));
        }

        // Set: "1,3,5,7"
        if s.contains(',') {
            let pages = s
                .split(',')
                .map(parse_page)
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(PageSelection::Set(pages));
        }

        parse_page(&s).map(PageSelection::Single)
    }
}

impl TryFrom<String> for PageSelection {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PageSelection> for String {
    fn from(value: PageSelection) -> Self {
        value.to_string()
    }
}

impl fmt::Display for PageSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageSelection::All => f.write_str("all"),
            PageSelection::Single(p) => write!(f, "{p}"),
            PageSelection::Range(s, e) => write!(f, "{s}-{e}"),
            PageSelection::Set(pages) => {
                let parts: Vec<String> = pages.iter().map(|p| p.to_string()).collect();
                f.write_str(&parts.join(","))
            }
        }
    }
}

/// How to separate pages in the rendered Markdown.
///
/// Serialised as `none`, `hr`, `comment`, or any other string (custom).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PageSeparator {
    /// No separator; pages joined with "\n\n". (default)
    #[default]
    None,
    /// Horizontal rule: "\n\n---\n\n"
    HorizontalRule,
    /// HTML comment with page number: "<!-- page N -->"
    Comment,
    /// Custom string inserted between pages.
    Custom(String),
}

impl PageSeparator {
    /// Render the separator string for the given page number (1-indexed).
    pub fn render(&self, page_num: usize) -> String {
        match self {
            PageSeparator::None => "\n\n".to_string(),
            PageSeparator::HorizontalRule => "\n\n---\n\n".to_string(),
            PageSeparator::Comment => format!("\n\n<!-- page {} -->\n\n", page_num),
            PageSeparator::Custom(s) => format!("\n\n{}\n\n", s),
        }
    }
}

impl From<String> for PageSeparator {
    fn from(s: String) -> Self {
        match s.to_lowercase().as_str() {
            "" | "none" => PageSeparator::None,
            "hr" | "---" => PageSeparator::HorizontalRule,
            "comment" => PageSeparator::Comment,
            _ => PageSeparator::Custom(s),
        }
    }
}

impl From<PageSeparator> for String {
    fn from(sep: PageSeparator) -> Self {
        match sep {
            PageSeparator::None => "none".to_string(),
            PageSeparator::HorizontalRule => "hr".to_string(),
            PageSeparator::Comment => "comment".to_string(),
            PageSeparator::Custom(s) => s,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_match_documented_values() {
        let c = ConversionConfig::default();
        assert_eq!(c.output_format, OutputFormat::Markdown);
        assert!(c.use_llm);
        assert_eq!(c.llm_service, LlmServiceKind::Ollama);
        assert_eq!(c.ollama_base_url, "http://localhost:11434");
        assert_eq!(c.ollama_model, "qwen2.5:14b");
        assert!(c.extra.is_empty());
        assert!(c.validate().is_ok());
    }

    #[test]
    fn partial_file_merges_over_defaults() {
        let c: ConversionConfig =
            serde_json::from_value(json!({ "use_llm": false, "ollama_model": "llama3:8b" }))
                .unwrap();
        assert!(!c.use_llm);
        assert_eq!(c.ollama_model, "llama3:8b");
        assert_eq!(c.ollama_base_url, "http://localhost:11434");
        assert_eq!(c.output_format, OutputFormat::Markdown);
    }

    #[test]
    fn unknown_keys_pass_through() {
        let c: ConversionConfig = serde_json::from_value(json!({
            "output_format": "html",
            "force_ocr": true,
            "languages": ["en", "de"]
        }))
        .unwrap();
        assert_eq!(c.output_format, OutputFormat::Html);
        assert_eq!(c.extra.get("force_ocr"), Some(&json!(true)));
        assert_eq!(c.extra.get("languages"), Some(&json!(["en", "de"])));

        let back = serde_json::to_value(&c).unwrap();
        assert_eq!(back["force_ocr"], json!(true));
        assert_eq!(back["languages"], json!(["en", "de"]));
    }

    #[test]
    fn legacy_service_class_path_is_accepted() {
        let c: ConversionConfig = serde_json::from_value(json!({
            "llm_service": "marker.services.ollama.OllamaService"
        }))
        .unwrap();
        assert_eq!(c.llm_service, LlmServiceKind::Ollama);

        let c: ConversionConfig = serde_json::from_value(json!({
            "llm_service": "marker.services.openai.OpenAIService"
        }))
        .unwrap();
        assert_eq!(c.llm_service, LlmServiceKind::OpenAi);
        assert_eq!(c.llm_model(), "gpt-4o-mini");
    }

    #[test]
    fn unknown_service_is_rejected() {
        let r: Result<ConversionConfig, _> =
            serde_json::from_value(json!({ "llm_service": "marker.services.claude.ClaudeService" }));
        assert!(r.is_err());
    }

    #[test]
    fn page_range_string_forms() {
        assert_eq!("all".parse::<PageSelection>().unwrap(), PageSelection::All);
        assert_eq!("5".parse::<PageSelection>().unwrap(), PageSelection::Single(5));
        assert_eq!(
            "3-15".parse::<PageSelection>().unwrap(),
            PageSelection::Range(3, 15)
        );
        assert_eq!(
            "1, 3,5".parse::<PageSelection>().unwrap(),
            PageSelection::Set(vec![1, 3, 5])
        );
        assert!("0".parse::<PageSelection>().is_err());
        assert!("9-2".parse::<PageSelection>().is_err());
        assert!("x".parse::<PageSelection>().is_err());
    }

    #[test]
    fn page_range_in_json() {
        let c: ConversionConfig =
            serde_json::from_value(json!({ "page_range": "2-4", "page_separator": "hr" })).unwrap();
        assert_eq!(c.page_range, PageSelection::Range(2, 4));
        assert_eq!(c.page_separator, PageSeparator::HorizontalRule);
        let v = serde_json::to_value(&c).unwrap();
        assert_eq!(v["page_range"], json!("2-4"));
        assert_eq!(v["page_separator"], json!("hr"));
    }

    #[test]
    fn page_selection_to_indices() {
        assert_eq!(PageSelection::All.to_indices(3), vec![0, 1, 2]);
        assert_eq!(PageSelection::Single(4).to_indices(3), Vec::<usize>::new());
        assert_eq!(PageSelection::Range(2, 10).to_indices(4), vec![1, 2, 3]);
        assert_eq!(
            PageSelection::Set(vec![3, 1, 3]).to_indices(5),
            vec![0, 2]
        );
    }

    #[test]
    fn separator_render() {
        assert_eq!(PageSeparator::None.render(2), "\n\n");
        assert_eq!(PageSeparator::Comment.render(2), "\n\n<!-- page 2 -->\n\n");
        assert_eq!(
            PageSeparator::from("* * *".to_string()),
            PageSeparator::Custom("* * *".into())
        );
    }

    #[test]
    fn builder_rejects_bad_url() {
        let r = ConversionConfig::builder()
            .ollama_base_url("localhost:11434/not a url")
            .build();
        assert!(matches!(r, Err(Pdf2MdError::InvalidConfig(_))));

        let r = ConversionConfig::builder()
            .ollama_base_url("ftp://example.org")
            .build();
        assert!(r.is_err());
    }

    #[test]
    fn builder_llm_model_targets_selected_service() {
        let c = ConversionConfig::builder()
            .llm_service(LlmServiceKind::OpenAi)
            .llm_model("gpt-4.1-mini")
            .build()
            .unwrap();
        assert_eq!(c.openai_model, "gpt-4.1-mini");
        assert_eq!(c.ollama_model, "qwen2.5:14b");
    }

    #[test]
    fn to_builder_does_not_touch_original() {
        let base = ConversionConfig::default();
        let derived = base.to_builder().use_llm(false).build().unwrap();
        assert!(base.use_llm);
        assert!(!derived.use_llm);
    }

    #[test]
    fn debug_redacts_secrets() {
        let c = ConversionConfig::builder()
            .openai_api_key("sk-secret")
            .password("hunter2")
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(!dbg.contains("hunter2"));
    }

    #[test]
    fn debug_lists_every_setting() {
        let c = ConversionConfig::builder()
            .refine_prompt("Tidy the page")
            .max_rendered_pixels(1234)
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(dbg.contains("refine_prompt: Some(\"Tidy the page\")"));
        assert!(dbg.contains("max_rendered_pixels: 1234"));
    }

    #[test]
    fn load_none_is_default() {
        assert_eq!(load_config(None).unwrap(), ConversionConfig::default());
    }

    #[test]
    fn load_missing_path_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist.json");
        assert_eq!(load_config(Some(&missing)).unwrap(), load_config(None).unwrap());
    }

    #[test]
    fn load_malformed_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ \"use_llm\": tru").unwrap();
        let err = load_config(Some(&path)).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
        assert!(err.to_string().contains("broken.json"));
    }

    #[test]
    fn load_wrong_type_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("typed.json");
        std::fs::write(&path, r#"{ "use_llm": "yes" }"#).unwrap();
        assert!(matches!(
            load_config(Some(&path)),
            Err(Pdf2MdError::Config { .. })
        ));
    }

    #[test]
    fn write_default_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.json");
        write_default_config(&path).unwrap();
        let loaded = load_config(Some(&path)).unwrap();
        assert_eq!(loaded, ConversionConfig::default());

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"ollama_model\": \"qwen2.5:14b\""));
    }
}
