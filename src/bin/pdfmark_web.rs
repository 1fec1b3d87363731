//! Web front-end binary: upload form, preview and downloads over HTTP.

use anyhow::{Context, Result};
use clap::Parser;
use pdfmark::load_config;
use pdfmark::server::{serve, AppState, DEFAULT_MAX_UPLOAD_BYTES};
use std::io;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Serve the pdfmark upload form.
#[derive(Parser, Debug)]
#[command(name = "pdfmark-web", version, about = "Web front-end for pdfmark")]
struct Cli {
    /// Address to bind.
    #[arg(long, env = "PDFMARK_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on.
    #[arg(short, long, env = "PDFMARK_PORT", default_value_t = 5000)]
    port: u16,

    /// JSON configuration file providing the form defaults.
    #[arg(short, long, env = "PDFMARK_CONFIG")]
    config: Option<PathBuf>,

    /// Base folder for conversion output.
    #[arg(long, env = "PDFMARK_OUTPUT_DIR", default_value = "output")]
    output_dir: PathBuf,

    /// History file. Defaults to <output-dir>/history.json.
    #[arg(long, env = "PDFMARK_HISTORY_FILE")]
    history_file: Option<PathBuf>,

    /// Maximum upload size in MiB.
    #[arg(long, env = "PDFMARK_MAX_UPLOAD_MB", default_value_t = DEFAULT_MAX_UPLOAD_BYTES / (1024 * 1024))]
    max_upload_mb: usize,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDFMARK_VERBOSE")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else {
        "info,tower_http=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    let history_file = cli
        .history_file
        .clone()
        .unwrap_or_else(|| cli.output_dir.join("history.json"));

    tokio::fs::create_dir_all(&cli.output_dir)
        .await
        .with_context(|| format!("Failed to create output folder {:?}", cli.output_dir))?;

    let state = AppState::new(config, cli.output_dir.clone(), history_file)
        .with_max_upload_bytes(cli.max_upload_mb.saturating_mul(1024 * 1024));

    serve(state, &cli.host, cli.port)
        .await
        .with_context(|| format!("Server on {}:{} failed", cli.host, cli.port))
}
