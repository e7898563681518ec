//! # scandex CLI
//!
//! ## Usage
//!
//! ```bash
//! scandex --config ./config/scandex.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `scandex init` | Wait for the store and create the index if missing |
//! | `scandex scan` | Index every new or changed file once, then exit |
//! | `scandex watch` | Initial scan, then filesystem events + periodic rescans |
//! | `scandex serve` | Start the read-only HTTP query API |
//! | `scandex run` | `watch` and `serve` in one process |
//! | `scandex search "<query>"` | Search indexed documents |
//! | `scandex get <filename>` | Print a stored document |
//! | `scandex list` | List indexed filenames |
//!
//! Logging goes to stderr and is controlled by `RUST_LOG`
//! (default `scandex=info`).

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use scandex::change_source;
use scandex::config::{self, Config};
use scandex::get;
use scandex::ingest::Pipeline;
use scandex::search;
use scandex::server;
use scandex::store::{self, DocumentStore};

/// scandex: OCR ingestion and full-text search for a folder of scanned documents.
#[derive(Parser)]
#[command(
    name = "scandex",
    about = "Watches a folder of scanned documents, OCRs them, and keeps a full-text search index in sync",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/scandex.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Wait for the store to become ready and create the index if missing.
    Init,

    /// Run the ingestion pipeline once over every file under the watch root.
    Scan,

    /// Keep the index in sync with the watch root until interrupted.
    ///
    /// Runs an initial scan, then reacts to filesystem events and rescans
    /// the whole tree every `watch.rescan_interval_secs`.
    Watch,

    /// Start the read-only HTTP query API on `server.bind`.
    Serve,

    /// Run `watch` and `serve` together in one process.
    Run,

    /// Search indexed documents.
    Search {
        /// Free-text query.
        query: String,

        /// Maximum number of results (capped at 20).
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Print the stored text of a document.
    Get {
        /// Filename the document was indexed under.
        filename: String,
    },

    /// List indexed filenames.
    List {
        /// Maximum number of entries (capped at 100).
        #[arg(long, default_value = "100")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "scandex=info".into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    let store = store::open_store(&cfg).await?;

    match cli.command {
        Commands::Init => {
            store::prepare(store.as_ref(), &cfg).await?;
            println!("ok");
        }
        Commands::Scan => {
            store::prepare(store.as_ref(), &cfg).await?;
            let pipeline = Pipeline::from_config(&cfg, Arc::clone(&store));
            let summary = change_source::rescan_once(&pipeline, &cfg.watch).await?;
            println!("scan {}", cfg.watch.root.display());
            println!("  files: {}", summary.seen);
            println!("  indexed: {}", summary.indexed);
            println!("  unchanged: {}", summary.unchanged);
            println!("  empty: {}", summary.empty);
            println!("  failed: {}", summary.failed);
            println!("ok");
        }
        Commands::Watch => {
            store::prepare(store.as_ref(), &cfg).await?;
            watch(&cfg, store).await?;
        }
        Commands::Serve => {
            store::prepare(store.as_ref(), &cfg).await?;
            server::run_server(&cfg, store).await?;
        }
        Commands::Run => {
            store::prepare(store.as_ref(), &cfg).await?;
            tokio::try_join!(
                watch(&cfg, Arc::clone(&store)),
                server::run_server(&cfg, store),
            )?;
        }
        // A database nobody has initialized yet reads as an empty index.
        Commands::Search { query, limit } => {
            store::ensure_index(store.as_ref()).await?;
            search::run_search(store, &query, limit).await?;
        }
        Commands::Get { filename } => {
            store::ensure_index(store.as_ref()).await?;
            get::run_get(store, &filename).await?;
        }
        Commands::List { limit } => {
            store::ensure_index(store.as_ref()).await?;
            get::run_list(store, limit).await?;
        }
    }

    Ok(())
}

async fn watch(cfg: &Config, store: Arc<dyn DocumentStore>) -> Result<()> {
    let pipeline = Arc::new(Pipeline::from_config(cfg, store));
    change_source::run(pipeline, cfg, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await
}
