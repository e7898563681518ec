//! Ingestion pipeline.
//!
//! [`Pipeline::process`] is the single entry point shared by the watcher and
//! the periodic rescan. For one candidate path it runs:
//!
//! filter → fingerprint → ledger check → extract → empty check → upsert → commit
//!
//! The ledger is only advanced after the store accepted the document, so any
//! failure along the way leaves the path eligible for the next pass. Per-file
//! errors never escape: every evaluation ends in an [`Outcome`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::extract::{ExtractError, OcrExtractor, TextExtractor};
use crate::fingerprint::fingerprint;
use crate::ledger::{Ledger, PathLocks};
use crate::models::{CandidatePath, ContentFingerprint, ExtractedDocument, IndexedDocument};
use crate::store::DocumentStore;

/// How one evaluation of a path ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// Not an existing regular file with a supported extension.
    Ignored,
    /// Could not be read in full, e.g. deleted or still being written.
    Unreadable,
    /// Already indexed with this exact content.
    Unchanged,
    ExtractFailed,
    /// OCR produced no text; treated as not ready yet.
    Empty,
    StoreFailed,
    Indexed,
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Ignored => "ignored",
            Outcome::Unreadable => "unreadable",
            Outcome::Unchanged => "unchanged",
            Outcome::ExtractFailed => "extract_failed",
            Outcome::Empty => "empty",
            Outcome::StoreFailed => "store_failed",
            Outcome::Indexed => "indexed",
        }
    }
}

/// Per-outcome counters for one pass over many paths.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PassSummary {
    pub seen: usize,
    pub indexed: usize,
    pub unchanged: usize,
    pub ignored: usize,
    pub empty: usize,
    pub failed: usize,
    pub pruned: usize,
}

impl PassSummary {
    pub fn record(&mut self, outcome: Outcome) {
        self.seen += 1;
        match outcome {
            Outcome::Indexed => self.indexed += 1,
            Outcome::Unchanged => self.unchanged += 1,
            Outcome::Ignored => self.ignored += 1,
            Outcome::Empty => self.empty += 1,
            Outcome::Unreadable | Outcome::ExtractFailed | Outcome::StoreFailed => {
                self.failed += 1
            }
        }
    }
}

pub struct Pipeline {
    store: Arc<dyn DocumentStore>,
    extractor: Arc<dyn TextExtractor>,
    ledger: Ledger,
    locks: PathLocks,
    ocr_slots: Semaphore,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        extractor: Arc<dyn TextExtractor>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            store,
            extractor,
            ledger: Ledger::new(),
            locks: PathLocks::new(),
            ocr_slots: Semaphore::new(max_concurrent.max(1)),
        }
    }

    /// Pipeline with the tesseract/pdftoppm extractor from `[ocr]`.
    pub fn from_config(config: &Config, store: Arc<dyn DocumentStore>) -> Self {
        Self::new(
            store,
            Arc::new(OcrExtractor::from_config(&config.ocr)),
            config.ocr.max_concurrent,
        )
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Evaluates one candidate path. Never fails; see [`Outcome`].
    pub async fn process(&self, path: &Path) -> Outcome {
        let Some(candidate) = CandidatePath::from_path(path) else {
            debug!("Ignoring {}", path.display());
            return Outcome::Ignored;
        };

        let lock = self.locks.lock_for(&candidate.path);
        let _guard = lock.lock().await;

        let fp = match self.fingerprint(&candidate.path).await {
            Ok(fp) => fp,
            Err(e) => {
                debug!("Cannot fingerprint {}: {}", candidate.path.display(), e);
                return Outcome::Unreadable;
            }
        };

        if !self.ledger.should_process(&candidate.path, &fp) {
            debug!("Unchanged {}", candidate.path.display());
            return Outcome::Unchanged;
        }

        let text = match self.extract(&candidate).await {
            Ok(text) => text,
            Err(e) => {
                error!("Extraction failed for {}: {}", candidate.path.display(), e);
                return Outcome::ExtractFailed;
            }
        };

        if text.trim().is_empty() {
            warn!(
                "No text extracted from {}; will retry on a later pass",
                candidate.path.display()
            );
            return Outcome::Empty;
        }

        let doc: IndexedDocument = ExtractedDocument {
            filename: candidate.filename(),
            text,
        }
        .into();

        if let Err(e) = self.store.upsert(&doc).await {
            error!("Failed to index {}: {:#}", doc.filename, e);
            return Outcome::StoreFailed;
        }

        self.ledger.mark_done(&candidate.path, fp);
        info!(
            "Indexed {} ({}, {} chars)",
            doc.filename,
            candidate.kind,
            doc.content.len()
        );
        Outcome::Indexed
    }

    /// Runs [`Pipeline::process`] over `paths` in order.
    pub async fn process_all(&self, paths: &[PathBuf]) -> PassSummary {
        let mut summary = PassSummary::default();
        for path in paths {
            summary.record(self.process(path).await);
        }
        summary
    }

    /// Drops ledger entries and idle path locks for files that no longer
    /// exist. Returns the number of ledger entries removed.
    ///
    /// Paths are stat'ed on the blocking pool with no lock held. A file
    /// recreated in between loses its entry and is extracted once more.
    pub async fn prune_missing(&self) -> usize {
        let mut tracked = self.ledger.paths();
        tracked.extend(self.locks.idle_paths());
        tracked.sort();
        tracked.dedup();

        let missing = match tokio::task::spawn_blocking(move || {
            tracked
                .into_iter()
                .filter(|path| !path.exists())
                .collect::<Vec<_>>()
        })
        .await
        {
            Ok(missing) => missing,
            Err(e) => {
                warn!("Prune task failed: {}", e);
                return 0;
            }
        };

        let released = self.locks.release_idle(&missing);
        let pruned = self.ledger.remove_all(&missing);
        debug!("Pruned {} ledger entries, {} path locks", pruned, released);
        pruned
    }

    async fn fingerprint(&self, path: &Path) -> std::io::Result<ContentFingerprint> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || fingerprint(&path))
            .await
            .map_err(std::io::Error::other)?
    }

    async fn extract(&self, candidate: &CandidatePath) -> Result<String, ExtractError> {
        let _permit = self
            .ocr_slots
            .acquire()
            .await
            .map_err(|e| ExtractError::Task(e.to_string()))?;

        let extractor = Arc::clone(&self.extractor);
        let path = candidate.path.clone();
        let kind = candidate.kind;
        tokio::task::spawn_blocking(move || extractor.extract(&path, kind))
            .await
            .map_err(|e| ExtractError::Task(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FileKind;
    use crate::store::InMemoryStore;
    use anyhow::bail;
    use async_trait::async_trait;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Returns the file's own bytes as text, so tests steer OCR output by
    /// what they write to disk. Counts calls.
    #[derive(Default)]
    struct EchoExtractor {
        calls: AtomicUsize,
    }

    impl TextExtractor for EchoExtractor {
        fn extract(&self, path: &Path, _kind: FileKind) -> Result<String, ExtractError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let bytes = fs::read(path).map_err(|source| ExtractError::Open {
                path: path.to_path_buf(),
                source,
            })?;
            Ok(String::from_utf8_lossy(&bytes).to_string())
        }
    }

    struct FailingExtractor;

    impl TextExtractor for FailingExtractor {
        fn extract(&self, _: &Path, _: FileKind) -> Result<String, ExtractError> {
            Err(ExtractError::Rasterize("corrupt file".to_string()))
        }
    }

    /// Rejects every write until `healthy` is set.
    #[derive(Default)]
    struct DownStore {
        inner: InMemoryStore,
        healthy: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl DocumentStore for DownStore {
        async fn ping(&self) -> anyhow::Result<()> {
            Ok(())
        }
        async fn index_exists(&self) -> anyhow::Result<bool> {
            Ok(true)
        }
        async fn create_index(&self) -> anyhow::Result<()> {
            Ok(())
        }
        async fn upsert(&self, doc: &IndexedDocument) -> anyhow::Result<()> {
            if !self.healthy.load(Ordering::SeqCst) {
                bail!("connection reset");
            }
            self.inner.upsert(doc).await
        }
        async fn get(&self, filename: &str) -> anyhow::Result<Option<IndexedDocument>> {
            self.inner.get(filename).await
        }
        async fn search(
            &self,
            query: &str,
            limit: usize,
        ) -> anyhow::Result<Vec<crate::models::SearchHit>> {
            self.inner.search(query, limit).await
        }
        async fn list(&self, limit: usize) -> anyhow::Result<Vec<crate::models::DocumentSummary>> {
            self.inner.list(limit).await
        }
    }

    fn setup() -> (TempDir, Arc<InMemoryStore>, Arc<EchoExtractor>, Pipeline) {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(InMemoryStore::new());
        let extractor = Arc::new(EchoExtractor::default());
        let pipeline = Pipeline::new(store.clone(), extractor.clone(), 2);
        (tmp, store, extractor, pipeline)
    }

    #[tokio::test]
    async fn unchanged_file_is_indexed_once() {
        let (tmp, store, extractor, pipeline) = setup();
        let path = tmp.path().join("invoice.pdf");
        fs::write(&path, "factura numero 42").unwrap();

        assert_eq!(pipeline.process(&path).await, Outcome::Indexed);
        assert_eq!(pipeline.process(&path).await, Outcome::Unchanged);

        assert_eq!(store.upsert_count(), 1);
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);
        assert_eq!(pipeline.ledger().len(), 1);
    }

    #[tokio::test]
    async fn changed_content_is_reindexed() {
        let (tmp, store, _extractor, pipeline) = setup();
        let path = tmp.path().join("scan.png");
        fs::write(&path, "first version").unwrap();
        assert_eq!(pipeline.process(&path).await, Outcome::Indexed);

        // Same length, so size-based change detection would miss it.
        fs::write(&path, "other version").unwrap();
        assert_eq!(pipeline.process(&path).await, Outcome::Indexed);

        assert_eq!(store.len(), 1);
        assert_eq!(
            store.get("scan.png").await.unwrap().unwrap().content,
            "other version"
        );
    }

    #[tokio::test]
    async fn identical_content_under_two_names_gives_two_entries() {
        let (tmp, store, _extractor, pipeline) = setup();
        let a = tmp.path().join("a.jpg");
        let b = tmp.path().join("b.jpg");
        fs::write(&a, "same words").unwrap();
        fs::write(&b, "same words").unwrap();

        assert_eq!(pipeline.process(&a).await, Outcome::Indexed);
        assert_eq!(pipeline.process(&b).await, Outcome::Indexed);

        assert_eq!(pipeline.ledger().get(&a), pipeline.ledger().get(&b));
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn empty_text_is_not_committed_and_recovers() {
        let (tmp, store, _extractor, pipeline) = setup();
        let path = tmp.path().join("blank.pdf");
        fs::write(&path, "   \n\t ").unwrap();

        assert_eq!(pipeline.process(&path).await, Outcome::Empty);
        assert_eq!(pipeline.process(&path).await, Outcome::Empty);
        assert!(store.is_empty());
        assert!(pipeline.ledger().get(&path).is_none());

        fs::write(&path, "now readable").unwrap();
        assert_eq!(pipeline.process(&path).await, Outcome::Indexed);
        assert_eq!(
            store.get("blank.pdf").await.unwrap().unwrap().content,
            "now readable"
        );
    }

    #[tokio::test]
    async fn unsupported_and_missing_paths_are_ignored() {
        let (tmp, store, extractor, pipeline) = setup();
        let txt = tmp.path().join("readme.txt");
        fs::write(&txt, "not a scan").unwrap();
        let dir = tmp.path().join("folder.pdf");
        fs::create_dir(&dir).unwrap();

        for _ in 0..3 {
            assert_eq!(pipeline.process(&txt).await, Outcome::Ignored);
        }
        assert_eq!(pipeline.process(&dir).await, Outcome::Ignored);
        assert_eq!(
            pipeline.process(&tmp.path().join("gone.pdf")).await,
            Outcome::Ignored
        );

        assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn extraction_failure_leaves_ledger_untouched() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(InMemoryStore::new());
        let pipeline = Pipeline::new(store.clone(), Arc::new(FailingExtractor), 1);
        let path = tmp.path().join("corrupt.pdf");
        fs::write(&path, "garbage").unwrap();

        assert_eq!(pipeline.process(&path).await, Outcome::ExtractFailed);
        assert_eq!(pipeline.process(&path).await, Outcome::ExtractFailed);
        assert!(pipeline.ledger().is_empty());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn store_failure_is_retried_on_next_pass() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(DownStore::default());
        let extractor = Arc::new(EchoExtractor::default());
        let pipeline = Pipeline::new(store.clone(), extractor.clone(), 1);
        let path = tmp.path().join("contract.pdf");
        fs::write(&path, "contrato de alquiler").unwrap();

        assert_eq!(pipeline.process(&path).await, Outcome::StoreFailed);
        assert!(pipeline.ledger().get(&path).is_none());

        store.healthy.store(true, Ordering::SeqCst);
        assert_eq!(pipeline.process(&path).await, Outcome::Indexed);
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 2);
        assert!(store.get("contract.pdf").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn concurrent_evaluations_of_one_path_extract_once() {
        let (tmp, store, extractor, pipeline) = setup();
        let pipeline = Arc::new(pipeline);
        let path = tmp.path().join("busy.pdf");
        fs::write(&path, "ocr me once").unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let p = Arc::clone(&pipeline);
            let path = path.clone();
            handles.push(tokio::spawn(async move { p.process(&path).await }));
        }
        let mut outcomes = Vec::new();
        for h in handles {
            outcomes.push(h.await.unwrap());
        }

        assert_eq!(outcomes.iter().filter(|o| **o == Outcome::Indexed).count(), 1);
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.upsert_count(), 1);
    }

    #[tokio::test]
    async fn prune_drops_deleted_paths_from_ledger_and_locks() {
        let (tmp, store, _extractor, pipeline) = setup();
        let kept = tmp.path().join("kept.pdf");
        let doomed = tmp.path().join("doomed.png");
        let blank = tmp.path().join("blank.jpg");
        fs::write(&kept, "stays").unwrap();
        fs::write(&doomed, "goes").unwrap();
        fs::write(&blank, "").unwrap();

        assert_eq!(pipeline.process(&kept).await, Outcome::Indexed);
        assert_eq!(pipeline.process(&doomed).await, Outcome::Indexed);
        // Never reaches the ledger but still leaves a lock behind.
        assert_eq!(pipeline.process(&blank).await, Outcome::Empty);
        assert_eq!(pipeline.locks.idle_paths().len(), 3);

        fs::remove_file(&doomed).unwrap();
        fs::remove_file(&blank).unwrap();
        assert_eq!(pipeline.prune_missing().await, 1);

        assert_eq!(pipeline.ledger().paths(), vec![kept.clone()]);
        assert_eq!(pipeline.locks.idle_paths(), vec![kept]);
        // The index keeps what was extracted.
        assert!(store.get("doomed.png").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn prune_keeps_lock_of_path_in_flight() {
        let (tmp, _store, _extractor, pipeline) = setup();
        let path = tmp.path().join("moving.pdf");
        let held = pipeline.locks.lock_for(&path);
        let _guard = held.lock().await;

        assert_eq!(pipeline.prune_missing().await, 0);
        assert!(Arc::ptr_eq(&held, &pipeline.locks.lock_for(&path)));
    }

    #[tokio::test]
    async fn pass_summary_counts_outcomes() {
        let (tmp, _store, _extractor, pipeline) = setup();
        let good = tmp.path().join("good.pdf");
        let empty = tmp.path().join("empty.png");
        let other = tmp.path().join("notes.txt");
        fs::write(&good, "text").unwrap();
        fs::write(&empty, "").unwrap();
        fs::write(&other, "text").unwrap();

        let paths = vec![good.clone(), empty, other, good];
        let summary = pipeline.process_all(&paths).await;
        assert_eq!(
            summary,
            PassSummary {
                seen: 4,
                indexed: 1,
                unchanged: 1,
                ignored: 1,
                empty: 1,
                failed: 0,
                pruned: 0,
            }
        );
    }
}
