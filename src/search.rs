//! Free-text search over indexed documents.
//!
//! Shared by the `scandex search` CLI command and `GET /search`. Both paths go
//! through [`search_documents`], which validates the query and bounds the
//! result count before asking the store.

use anyhow::Result;
use std::sync::Arc;

use crate::models::SearchHit;
use crate::store::DocumentStore;

/// Maximum hits returned by one search.
pub const SEARCH_LIMIT: usize = 20;

/// Failure of a read-only query against the store.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("query must not be empty")]
    EmptyQuery,
    #[error("document not found: {0}")]
    NotFound(String),
    #[error("store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

/// Ranked hits for `query`, best first, at most `min(limit, SEARCH_LIMIT)`.
pub async fn search_documents(
    store: &dyn DocumentStore,
    query: &str,
    limit: usize,
) -> Result<Vec<SearchHit>, QueryError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(QueryError::EmptyQuery);
    }

    let mut hits = store.search(query, limit.min(SEARCH_LIMIT)).await?;
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(hits)
}

/// CLI entry point for `scandex search`.
pub async fn run_search(store: Arc<dyn DocumentStore>, query: &str, limit: usize) -> Result<()> {
    let hits = search_documents(store.as_ref(), query, limit).await?;

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        println!("{}. [{:.3}] {}", i + 1, hit.score, hit.filename);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IndexedDocument;
    use crate::store::InMemoryStore;

    async fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        for i in 0..30 {
            store
                .upsert(&IndexedDocument {
                    filename: format!("recibo{:02}.png", i),
                    content: "recibo de compra".to_string(),
                })
                .await
                .unwrap();
        }
        store
            .upsert(&IndexedDocument {
                filename: "factura.pdf".to_string(),
                content: "factura recibo compra".to_string(),
            })
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let store = seeded().await;
        for q in ["", "   ", "\t\n"] {
            assert!(matches!(
                search_documents(&store, q, 10).await,
                Err(QueryError::EmptyQuery)
            ));
        }
    }

    #[tokio::test]
    async fn results_are_bounded_and_ordered() {
        let store = seeded().await;
        let hits = search_documents(&store, "factura recibo", 100).await.unwrap();
        assert_eq!(hits.len(), SEARCH_LIMIT);
        assert_eq!(hits[0].filename, "factura.pdf");
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));

        let few = search_documents(&store, "recibo", 3).await.unwrap();
        assert_eq!(few.len(), 3);
    }

    #[tokio::test]
    async fn no_match_is_empty_not_error() {
        let store = seeded().await;
        assert!(search_documents(&store, "hipoteca", 10)
            .await
            .unwrap()
            .is_empty());
    }
}
