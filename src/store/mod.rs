//! Search store abstraction.
//!
//! The [`DocumentStore`] trait is the only way the rest of the crate talks to
//! the full-text index. Documents are keyed by filename and every write is an
//! upsert, so re-indexing a file overwrites its entry instead of adding a
//! second one.
//!
//! Backends:
//!
//! | Backend | Type | Notes |
//! |---------|------|-------|
//! | `sqlite` | [`SqliteStore`] | FTS5 table, BM25 ranking |
//! | `elasticsearch` | [`ElasticStore`] | HTTP API, `match` query on `content` |
//! | `memory` | [`InMemoryStore`] | Term-count ranking; tests and single-process `run` |

pub mod elastic;
pub mod memory;
pub mod sqlite;

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Config;
use crate::models::{DocumentSummary, IndexedDocument, SearchHit};

pub use elastic::ElasticStore;
pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Abstract full-text document store.
///
/// Implementations must be `Send + Sync`; the pipeline and the HTTP server
/// share one instance behind an `Arc`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Readiness check. `Ok(())` once the backend accepts requests.
    async fn ping(&self) -> Result<()>;

    /// Whether the document index exists.
    async fn index_exists(&self) -> Result<bool>;

    /// Creates the document index.
    async fn create_index(&self) -> Result<()>;

    /// Inserts or overwrites the document stored under `doc.filename`.
    async fn upsert(&self, doc: &IndexedDocument) -> Result<()>;

    /// Fetches a document by filename.
    async fn get(&self, filename: &str) -> Result<Option<IndexedDocument>>;

    /// Free-text search over content, best match first.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>>;

    /// Lists indexed filenames.
    async fn list(&self, limit: usize) -> Result<Vec<DocumentSummary>>;
}

/// Builds the store selected by `[store].backend`.
pub async fn open_store(config: &Config) -> Result<Arc<dyn DocumentStore>> {
    let store: Arc<dyn DocumentStore> = match config.store.backend.as_str() {
        "sqlite" => Arc::new(SqliteStore::open(&config.store.path).await?),
        "elasticsearch" => {
            let url = config
                .store
                .url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("store.url is required for elasticsearch"))?;
            Arc::new(ElasticStore::new(url, &config.store.index)?)
        }
        "memory" => Arc::new(InMemoryStore::new()),
        other => bail!("Unknown store backend: '{}'", other),
    };
    Ok(store)
}

/// Polls [`DocumentStore::ping`] until it succeeds, up to `attempts` times.
pub async fn wait_until_ready(
    store: &dyn DocumentStore,
    attempts: u32,
    interval: Duration,
) -> Result<()> {
    for attempt in 1..=attempts {
        match store.ping().await {
            Ok(()) => {
                info!("Store ready");
                return Ok(());
            }
            Err(e) => {
                warn!("Waiting for store ({}/{}): {}", attempt, attempts, e);
                if attempt < attempts {
                    tokio::time::sleep(interval).await;
                }
            }
        }
    }
    bail!("store did not become ready after {} attempts", attempts)
}

/// Creates the index if it does not exist yet.
pub async fn ensure_index(store: &dyn DocumentStore) -> Result<()> {
    if !store.index_exists().await? {
        store.create_index().await?;
        info!("Index created");
    }
    Ok(())
}

/// Readiness wait followed by index bootstrap, as done at every startup.
pub async fn prepare(store: &dyn DocumentStore, config: &Config) -> Result<()> {
    wait_until_ready(
        store,
        config.store.ready_attempts,
        config.store.ready_interval(),
    )
    .await?;
    ensure_index(store).await
}
