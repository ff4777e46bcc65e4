//! fundcrawl CLI
//!
//! Local execution entry point for the crawl engine.

use std::io::Write as _;
use std::path::PathBuf;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use fundcrawl::{
    api::{GraphTransport, TokenCache, TokenProvider},
    crawl::{CrawlOptions, CrawlOrchestrator},
    error::Result,
    models::Config,
    storage::{self, CursorStore, SessionExporter},
};

/// fundcrawl - Resumable crowdfunding project crawler
#[derive(Parser, Debug)]
#[command(
    name = "fundcrawl",
    version,
    about = "Resumable crowdfunding dataset crawler"
)]
struct Cli {
    /// Path to the data directory holding state, config, and exports
    /// (defaults to storage.data_dir from config.toml)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl projects, resuming from the persisted cursor
    Crawl {
        /// Stop after this many projects (overrides config; 0 = unbounded)
        #[arg(long)]
        max_records: Option<usize>,

        /// Projects requested per page (overrides config)
        #[arg(long)]
        batch_size: Option<usize>,

        /// Base delay between detail fetches in milliseconds (overrides config)
        #[arg(long)]
        item_delay_ms: Option<u64>,

        /// Auth token to start with (otherwise requested on demand)
        #[arg(long)]
        token: Option<String>,
    },

    /// Forget the pagination cursor; the next crawl starts from the beginning
    ResetPagination,

    /// Close the current export session; the next crawl writes a new dataset
    NewSession,

    /// Show persisted crawl and session state
    Status,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Asks the operator for a fresh token on stdin.
///
/// An empty line declines, which stops the crawl cleanly. A provided token is
/// installed into the shared cache before the orchestrator retries.
struct StdinTokenProvider {
    tokens: TokenCache,
}

#[async_trait]
impl TokenProvider for StdinTokenProvider {
    async fn request_token(&self) -> Option<String> {
        print!("Auth token required. Paste a new token (empty line to stop): ");
        let _ = std::io::stdout().flush();

        // Blocking stdin read, moved off the async runtime.
        let line = tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            std::io::stdin().read_line(&mut line).ok().map(|_| line)
        })
        .await
        .ok()??;

        let token = line.trim();
        if token.is_empty() {
            return None;
        }

        self.tokens.set(token);
        Some(token.to_string())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    log::info!("fundcrawl starting...");

    // The config file lives inside the data directory, so the flag must win
    // before the config is read; the config's own data_dir covers the
    // flag-less case.
    let data_dir = cli.data_dir.clone().unwrap_or_else(|| PathBuf::from("data"));

    let config_path = data_dir.join("config.toml");
    let config = Config::load_or_default(&config_path);
    config.validate()?;

    let data_dir = cli.data_dir.unwrap_or(config.storage.data_dir.clone());
    log::info!("Using data directory {}", data_dir.display());

    match cli.command {
        Command::Crawl {
            max_records,
            batch_size,
            item_delay_ms,
            token,
        } => {
            let tokens = TokenCache::new(token);
            let transport = GraphTransport::new(&config.api, tokens.clone())?;
            let cursor_store = CursorStore::new(&data_dir);
            let exporter = SessionExporter::open(&data_dir).await?;

            let mut orchestrator = CrawlOrchestrator::new(transport, cursor_store, exporter);

            // Ctrl-C requests a cooperative stop; state stays consistent.
            let stop = orchestrator.stop_handle();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    stop.stop();
                }
            });

            let options = CrawlOptions {
                batch_size: batch_size.unwrap_or(config.crawl.batch_size),
                max_records: max_records.unwrap_or(config.crawl.max_records),
                base_delay: std::time::Duration::from_millis(
                    item_delay_ms.unwrap_or(config.crawl.item_delay_ms),
                ),
            };
            let provider = StdinTokenProvider { tokens };

            let summary = orchestrator.start(&options, &provider).await?;

            log::info!(
                "Crawl complete: {} projects this run, {} rows in {}",
                summary.processed,
                orchestrator.exporter().rows_exported(),
                orchestrator.exporter().dataset_path().display()
            );
        }

        Command::ResetPagination => {
            let store = CursorStore::new(&data_dir);
            store.reset().await?;
            log::info!("Pagination reset. The next crawl starts from the beginning.");
        }

        Command::NewSession => {
            SessionExporter::start_new_session(&data_dir).await?;
            log::info!("Session closed. The next crawl writes a new dataset.");
        }

        Command::Status => {
            let store = CursorStore::new(&data_dir);
            let cursor = store.load().await?;
            log::info!("Data directory: {}", data_dir.display());
            log::info!(
                "Cursor: {}",
                cursor.as_deref().unwrap_or("(start of sequence)")
            );
            log::info!(
                "More pages: {}",
                if store.has_more().await? { "yes" } else { "no" }
            );

            let marker_path = data_dir.join(storage::SESSION_MARKER_FILE);
            if marker_path.exists() {
                if let Ok(content) = std::fs::read_to_string(&marker_path) {
                    if let Ok(marker) = serde_json::from_str::<serde_json::Value>(&content) {
                        if let Some(dataset) = marker.get("dataset_file") {
                            log::info!("Active dataset: {}", dataset);
                        }
                        if let Some(started) = marker.get("started_at") {
                            log::info!("Session started: {}", started);
                        }
                    }
                }
            } else {
                log::info!("No active export session.");
            }
        }
    }

    log::info!("Done!");

    Ok(())
}
