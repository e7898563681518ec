//! In-memory [`DocumentStore`] implementation.
//!
//! Uses a `HashMap` behind a `RwLock`. Search scores a document by how many
//! distinct query terms appear in its content. Also counts upserts, which the
//! pipeline tests use to check idempotence.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;

use crate::models::{DocumentSummary, IndexedDocument, SearchHit};

use super::DocumentStore;

#[derive(Default)]
pub struct InMemoryStore {
    docs: RwLock<HashMap<String, IndexedDocument>>,
    index_created: AtomicBool,
    upserts: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of upserts accepted since creation.
    pub fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.docs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.read().is_empty()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn index_exists(&self) -> Result<bool> {
        Ok(self.index_created.load(Ordering::SeqCst))
    }

    async fn create_index(&self) -> Result<()> {
        self.index_created.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn upsert(&self, doc: &IndexedDocument) -> Result<()> {
        self.docs.write().insert(doc.filename.clone(), doc.clone());
        self.upserts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get(&self, filename: &str) -> Result<Option<IndexedDocument>> {
        Ok(self.docs.read().get(filename).cloned())
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let query_lower = query.to_lowercase();
        let mut terms: Vec<&str> = query_lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();
        terms.sort_unstable();
        terms.dedup();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let docs = self.docs.read();
        let mut hits: Vec<SearchHit> = docs
            .values()
            .filter_map(|doc| {
                let words: Vec<String> = doc
                    .content
                    .to_lowercase()
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|w| !w.is_empty())
                    .map(str::to_string)
                    .collect();
                let matches = terms
                    .iter()
                    .filter(|t| words.iter().any(|w| w == *t))
                    .count();
                (matches > 0).then(|| SearchHit {
                    filename: doc.filename.clone(),
                    score: matches as f64,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.filename.cmp(&b.filename))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn list(&self, limit: usize) -> Result<Vec<DocumentSummary>> {
        let docs = self.docs.read();
        let mut names: Vec<&String> = docs.keys().collect();
        names.sort();
        Ok(names
            .into_iter()
            .take(limit)
            .map(|n| DocumentSummary {
                filename: n.clone(),
            })
            .collect())
    }
}
