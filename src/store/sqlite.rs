//! SQLite-backed [`DocumentStore`] implementation.
//!
//! Documents live in a plain `documents` table keyed by filename and are
//! mirrored into the `documents_fts` FTS5 table for ranked search. Both are
//! rewritten in one transaction per upsert.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::path::Path;

use crate::db;
use crate::migrate;
use crate::models::{DocumentSummary, IndexedDocument, SearchHit};

use super::DocumentStore;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens (creating if missing) the database file at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(db::connect(path).await?))
    }
}

/// Turns free text into an FTS5 query matching any of its words, like a
/// full-text `match` query. Punctuation is dropped and every word is quoted,
/// so FTS5 operators typed by a user are searched as plain words.
pub fn fts_match_query(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn index_exists(&self) -> Result<bool> {
        migrate::schema_exists(&self.pool).await
    }

    async fn create_index(&self) -> Result<()> {
        migrate::run_migrations(&self.pool).await
    }

    async fn upsert(&self, doc: &IndexedDocument) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO documents (filename, content, indexed_at)
            VALUES (?, ?, ?)
            ON CONFLICT(filename) DO UPDATE SET
                content = excluded.content,
                indexed_at = excluded.indexed_at
            "#,
        )
        .bind(&doc.filename)
        .bind(&doc.content)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM documents_fts WHERE filename = ?")
            .bind(&doc.filename)
            .execute(&mut *tx)
            .await?;

        sqlx::query("INSERT INTO documents_fts (filename, content) VALUES (?, ?)")
            .bind(&doc.filename)
            .bind(&doc.content)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, filename: &str) -> Result<Option<IndexedDocument>> {
        let row = sqlx::query("SELECT filename, content FROM documents WHERE filename = ?")
            .bind(filename)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| IndexedDocument {
            filename: r.get("filename"),
            content: r.get("content"),
        }))
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let Some(fts_query) = fts_match_query(query) else {
            return Ok(Vec::new());
        };

        let rows = sqlx::query(
            r#"
            SELECT filename, rank
            FROM documents_fts
            WHERE documents_fts MATCH ?
            ORDER BY rank
            LIMIT ?
            "#,
        )
        .bind(&fts_query)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let hits = rows
            .iter()
            .map(|row| {
                let rank: f64 = row.get("rank");
                SearchHit {
                    filename: row.get("filename"),
                    score: -rank, // negate so higher = better
                }
            })
            .collect();

        Ok(hits)
    }

    async fn list(&self, limit: usize) -> Result<Vec<DocumentSummary>> {
        let rows = sqlx::query("SELECT filename FROM documents ORDER BY filename ASC LIMIT ?")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|r| DocumentSummary {
                filename: r.get("filename"),
            })
            .collect())
    }
}
