use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use parley_core::Backend;
use parley_http::HttpBackend;
use parley_render::KrokiBackend;

mod config;
mod controller;
mod settings;
mod tui;

use config::ClientConfig;
use tui::App;

#[derive(Parser)]
#[command(name = "parley")]
#[command(author, version, about = "Terminal client for a streaming chat backend", long_about = None)]
struct Cli {
    /// Backend base URL (overrides config)
    #[arg(long)]
    base_url: Option<String>,

    /// Open this conversation id on startup
    #[arg(short, long)]
    conversation: Option<i64>,

    /// Diagram rendering service base URL (overrides config)
    #[arg(long)]
    diagram_url: Option<String>,

    /// Write debug logs to file (JSON-lines format)
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ClientConfig::load()?;

    let log_file = cli.log_file.clone().or_else(|| config.log_file.clone());
    init_tracing(cli.debug, log_file.as_deref())?;

    let base_url = cli.base_url.unwrap_or_else(|| config.base_url.clone());
    let diagram_url = cli.diagram_url.unwrap_or_else(|| config.diagram_url.clone());

    let backend: Arc<dyn Backend> = Arc::new(HttpBackend::new(base_url));
    let diagrams = Arc::new(KrokiBackend::new(diagram_url));

    let mut app = App::new(backend, diagrams);
    if let Some(id) = cli.conversation {
        app.open_by_id(id).await;
    }
    app.run().await
}

/// Set up logging. The TUI owns the terminal, so tracing output goes to a
/// file when one is given and is suppressed otherwise.
fn init_tracing(debug: bool, log_file: Option<&std::path::Path>) -> Result<()> {
    let level = if debug { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match log_file {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("failed to create log file {}", path.display()))?;
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::sync::Mutex::new(file)))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::sink)
                .init();
        }
    }
    Ok(())
}
