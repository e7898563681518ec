//! Document retrieval by filename, and the document listing.
//!
//! Used by the `scandex get` / `scandex list` CLI commands and by
//! `GET /document/{filename}` / `GET /documents`.

use anyhow::Result;
use std::sync::Arc;

use crate::models::{DocumentSummary, IndexedDocument};
use crate::search::QueryError;
use crate::store::DocumentStore;

/// Maximum entries returned by one listing.
pub const LIST_LIMIT: usize = 100;

/// Full stored content for `filename`.
pub async fn get_document(
    store: &dyn DocumentStore,
    filename: &str,
) -> Result<IndexedDocument, QueryError> {
    store
        .get(filename)
        .await?
        .ok_or_else(|| QueryError::NotFound(filename.to_string()))
}

/// Indexed filenames, at most `min(limit, LIST_LIMIT)`.
pub async fn list_documents(
    store: &dyn DocumentStore,
    limit: usize,
) -> Result<Vec<DocumentSummary>, QueryError> {
    Ok(store.list(limit.min(LIST_LIMIT)).await?)
}

/// CLI entry point for `scandex get`. Fails when the document is absent.
pub async fn run_get(store: Arc<dyn DocumentStore>, filename: &str) -> Result<()> {
    let doc = get_document(store.as_ref(), filename).await?;

    println!("--- {} ---", doc.filename);
    println!("{}", doc.content);

    Ok(())
}

/// CLI entry point for `scandex list`.
pub async fn run_list(store: Arc<dyn DocumentStore>, limit: usize) -> Result<()> {
    let docs = list_documents(store.as_ref(), limit).await?;

    if docs.is_empty() {
        println!("No documents indexed.");
        return Ok(());
    }

    for doc in &docs {
        println!("{}", doc.filename);
    }
    println!("{} document(s)", docs.len());

    Ok(())
}
