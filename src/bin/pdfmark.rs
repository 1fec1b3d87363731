//! CLI binary for pdfmark.
//!
//! A thin shim over the library crate: loads the configuration file, applies
//! flag overrides, runs one conversion and prints where the files went.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdfmark::{
    document_dir, load_config, write_default_config, ConversionConfig, ConversionProgressCallback,
    Converter, LlmServiceKind, OutputFormat, PageSelection, PageSeparator, ProgressCallback,
};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── Progress bar ─────────────────────────────────────────────────────────────

/// Spinner while the PDF opens, then a page bar with one log line per page.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed_secs(&self, page_num: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&page_num))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, total_pages: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total_pages as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Converting");
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Converting {total_pages} pages…"))
        ));
    }

    fn on_page_start(&self, page_num: usize, _total_pages: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(page_num, Instant::now());
        }
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total_pages: usize, markdown_len: usize) {
        let secs = self.elapsed_secs(page_num);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<8}  {}",
            green("✓"),
            page_num,
            total_pages,
            dim(&format!("{markdown_len:>5} chars")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let secs = self.elapsed_secs(page_num);
        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(std::iter::once('…')).collect()
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total_pages,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        // The conversion stops at the first failed page.
        self.bar.abandon();
    }

    fn on_conversion_complete(&self, _total_pages: usize, success_count: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} pages converted",
            green("✔"),
            bold(&success_count.to_string())
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert into ./report/ (report.md, images, meta.json)
  pdfmark --pdf report.pdf

  # Choose the output base folder and a config file
  pdfmark --pdf report.pdf --output out --config config.json

  # Write a default config file and exit
  pdfmark --create-config config.json

  # Skip the LLM pass, first ten pages only, HTML output
  pdfmark --pdf book.pdf --no-llm --pages 1-10 --format html

CONFIG FILE (JSON, every key optional):
  output_format     markdown | html | json
  use_llm           true | false
  llm_service       ollama | openai
  ollama_base_url   default http://localhost:11434
  ollama_model      default qwen2.5:14b
  Unknown keys are kept as-is.

ENVIRONMENT VARIABLES:
  PDFMARK_*         Fallback for each flag (e.g. PDFMARK_MODEL)
  OPENAI_API_KEY    Key for the openai service when the config has none
  PDFIUM_LIB_PATH   Path to libpdfium (file or directory)
  RUST_LOG          Overrides -v / -q log filtering
"#;

/// Convert a PDF into Markdown, images and meta.json.
#[derive(Parser, Debug)]
#[command(
    name = "pdfmark",
    version,
    about = "Convert a PDF into Markdown, images and meta.json, optionally refined by an LLM",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF file to convert.
    #[arg(long, env = "PDFMARK_PDF", required_unless_present = "create_config")]
    pdf: Option<PathBuf>,

    /// Base folder; files go to <output>/<pdf stem>/. Defaults to the current directory.
    #[arg(short, long, env = "PDFMARK_OUTPUT")]
    output: Option<PathBuf>,

    /// JSON configuration file.
    #[arg(short, long, env = "PDFMARK_CONFIG")]
    config: Option<PathBuf>,

    /// Write the default configuration to this path and exit.
    #[arg(long, value_name = "PATH")]
    create_config: Option<PathBuf>,

    /// Disable the LLM refinement pass.
    #[arg(long, env = "PDFMARK_NO_LLM")]
    no_llm: bool,

    /// LLM service: ollama or openai.
    #[arg(long, env = "PDFMARK_SERVICE")]
    service: Option<LlmServiceKind>,

    /// Model for the selected LLM service.
    #[arg(long, env = "PDFMARK_MODEL")]
    model: Option<String>,

    /// Output format: markdown, html or json.
    #[arg(long, env = "PDFMARK_FORMAT")]
    format: Option<OutputFormat>,

    /// Page selection: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, env = "PDFMARK_PAGES")]
    pages: Option<PageSelection>,

    /// Page separator: none, hr, comment, or a custom string.
    #[arg(long, env = "PDFMARK_SEPARATOR")]
    separator: Option<String>,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDFMARK_PASSWORD")]
    password: Option<String>,

    /// Disable progress bar.
    #[arg(long, env = "PDFMARK_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDFMARK_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDFMARK_QUIET", conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO lines unless -v asks for them.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Create-config mode ───────────────────────────────────────────────
    if let Some(ref path) = cli.create_config {
        write_default_config(path)
            .with_context(|| format!("Failed to write default configuration to {:?}", path))?;
        if !cli.quiet {
            eprintln!(
                "{} Default configuration written to {}",
                green("✔"),
                bold(&path.display().to_string())
            );
        }
        return Ok(());
    }

    let pdf = cli
        .pdf
        .clone()
        .context("--pdf is required unless --create-config is given")?;

    // ── Build config ─────────────────────────────────────────────────────
    let base = load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    let config = apply_overrides(&cli, base)?;

    let output_dir = document_dir(
        cli.output.as_deref().unwrap_or_else(|| Path::new(".")),
        &pdf,
    );

    let mut converter = Converter::new();
    if show_progress {
        converter = converter.with_progress(CliProgressCallback::new() as ProgressCallback);
    }

    // ── Run conversion ───────────────────────────────────────────────────
    let start = Instant::now();
    let artifacts = converter
        .convert(&pdf, &output_dir, &config)
        .await
        .map_err(|e| {
            let kind = e.kind();
            anyhow::Error::new(e).context(format!("Conversion failed ({kind})"))
        })?;

    if !cli.quiet {
        eprintln!(
            "{}  {}  →  {}",
            green("✔"),
            dim(&format!("{:.1}s", start.elapsed().as_secs_f64())),
            bold(&artifacts.directory.display().to_string()),
        );
        eprintln!("   document  {}", artifacts.document.display());
        eprintln!("   images    {}", artifacts.images.len());
        eprintln!("   metadata  {}", artifacts.metadata.display());
    }

    Ok(())
}

/// Layer CLI flags over the loaded configuration.
fn apply_overrides(cli: &Cli, base: ConversionConfig) -> Result<ConversionConfig> {
    let mut builder = base.to_builder();

    if cli.no_llm {
        builder = builder.use_llm(false);
    }
    if let Some(service) = cli.service {
        builder = builder.llm_service(service);
    }
    // After the service so the model lands on the selected one.
    if let Some(ref model) = cli.model {
        builder = builder.llm_model(model.clone());
    }
    if let Some(format) = cli.format {
        builder = builder.output_format(format);
    }
    if let Some(ref pages) = cli.pages {
        builder = builder.pages(pages.clone());
    }
    if let Some(ref separator) = cli.separator {
        builder = builder.page_separator(PageSeparator::from(separator.clone()));
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password.clone());
    }

    builder.build().context("Invalid configuration")
}
