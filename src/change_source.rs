//! Change source: filesystem events plus periodic rescans.
//!
//! Two producers feed [`Pipeline::process`] as independent tasks. The watcher
//! forwards candidate paths soon after the OS reports them, once a path has
//! been quiet for the settle delay so a copy in progress can finish. The
//! rescan lists the whole tree on a fixed interval and is the one that
//! guarantees every file is eventually seen. Both may hit the same path at
//! once; the pipeline's per-path lock and fingerprint check make that harmless.

use anyhow::{anyhow, Context, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::{Config, WatchConfig};
use crate::connector_fs;
use crate::ingest::{PassSummary, Pipeline};
use crate::watcher::{FileChange, FsWatcher, PendingChanges};

/// One full pass over the watched tree, pruning ledger entries and path
/// locks for files that no longer exist.
pub async fn rescan_once(pipeline: &Pipeline, watch: &WatchConfig) -> Result<PassSummary> {
    let paths = connector_fs::scan_directory(watch)?;
    let mut summary = pipeline.process_all(&paths).await;
    summary.pruned = pipeline.prune_missing().await;
    Ok(summary)
}

/// Runs the initial scan, the watcher and the periodic rescan until
/// `shutdown` resolves.
///
/// Per-file failures never end the loop. A rescan that cannot list the root
/// (e.g. an unmounted share) is logged and retried on the next tick.
pub async fn run<F>(pipeline: Arc<Pipeline>, config: &Config, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let watch = config.watch.clone();

    let initial = rescan_once(&pipeline, &watch)
        .await
        .context("Initial scan failed")?;
    log_pass("Initial scan", &initial);

    let (tx, mut rx) = mpsc::unbounded_channel::<FileChange>();
    let excludes = connector_fs::build_excludes(&watch.exclude_globs)?;
    let settle = watch.settle_delay();
    let _watcher = FsWatcher::start(&watch.root, settle, excludes, tx)
        .with_context(|| format!("Failed to watch {}", watch.root.display()))?;
    info!(
        "Watching {} (rescan every {}s)",
        watch.root.display(),
        watch.rescan_interval_secs
    );

    let mut rescans = tokio::spawn(rescan_loop(Arc::clone(&pipeline), watch));
    let mut pending = PendingChanges::new(settle);
    let mut in_flight = JoinSet::new();
    tokio::pin!(shutdown);

    let result = loop {
        let deadline = pending.next_deadline();
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutting down change source");
                break Ok(());
            }
            Some(change) = rx.recv() => {
                pending.enqueue(change, Instant::now());
            }
            _ = sleep_until(deadline), if deadline.is_some() => {
                for change in pending.flush_ready(Instant::now()) {
                    spawn_process(&mut in_flight, Arc::clone(&pipeline), change);
                }
            }
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                if let Err(e) = joined {
                    warn!("Event task failed: {}", e);
                }
            }
            joined = &mut rescans => {
                break Err(anyhow!("Rescan loop stopped: {:?}", joined.err()));
            }
        }
    };

    rescans.abort();
    in_flight.shutdown().await;
    result
}

/// Rescans every `rescan_interval_secs`; the initial scan covers the first tick.
async fn rescan_loop(pipeline: Arc<Pipeline>, watch: WatchConfig) {
    let mut ticker = tokio::time::interval(watch.rescan_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        match rescan_once(&pipeline, &watch).await {
            Ok(summary) => log_pass("Rescan", &summary),
            Err(e) => warn!("Rescan failed: {:#}", e),
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    if let Some(deadline) = deadline {
        tokio::time::sleep_until(deadline.into()).await;
    }
}

fn spawn_process(tasks: &mut JoinSet<()>, pipeline: Arc<Pipeline>, change: FileChange) {
    tasks.spawn(async move {
        let outcome = pipeline.process(&change.path).await;
        debug!(
            "{:?} {} -> {}",
            change.kind,
            change.path.display(),
            outcome.label()
        );
    });
}

fn log_pass(label: &str, summary: &PassSummary) {
    if summary.indexed > 0 || summary.failed > 0 || summary.pruned > 0 {
        info!(
            "{}: {} files, {} indexed, {} unchanged, {} empty, {} failed, {} pruned",
            label,
            summary.seen,
            summary.indexed,
            summary.unchanged,
            summary.empty,
            summary.failed,
            summary.pruned
        );
    } else {
        debug!("{}: {} files, nothing new", label, summary.seen);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{ExtractError, TextExtractor};
    use crate::models::FileKind;
    use crate::store::{DocumentStore, InMemoryStore};
    use std::fs;
    use std::io::Write;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    #[derive(Default)]
    struct EchoExtractor {
        calls: AtomicUsize,
    }

    impl TextExtractor for EchoExtractor {
        fn extract(&self, path: &Path, _: FileKind) -> Result<String, ExtractError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            fs::read_to_string(path).map_err(|source| ExtractError::Open {
                path: path.to_path_buf(),
                source,
            })
        }
    }

    /// `slow.pdf` reads as blank the first time, then blocks until released.
    /// Everything else echoes its content.
    #[derive(Default)]
    struct StallingExtractor {
        slow_calls: AtomicUsize,
        released: AtomicBool,
    }

    impl TextExtractor for StallingExtractor {
        fn extract(&self, path: &Path, _: FileKind) -> Result<String, ExtractError> {
            if path.file_name().is_some_and(|n| n == "slow.pdf") {
                if self.slow_calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    return Ok(String::new());
                }
                for _ in 0..1000 {
                    if self.released.load(Ordering::SeqCst) {
                        break;
                    }
                    std::thread::sleep(Duration::from_millis(10));
                }
            }
            fs::read_to_string(path).map_err(|source| ExtractError::Open {
                path: path.to_path_buf(),
                source,
            })
        }
    }

    fn pipeline() -> (Arc<InMemoryStore>, Arc<EchoExtractor>, Arc<Pipeline>) {
        let store = Arc::new(InMemoryStore::new());
        let extractor = Arc::new(EchoExtractor::default());
        let pipeline = Arc::new(Pipeline::new(store.clone(), extractor.clone(), 2));
        (store, extractor, pipeline)
    }

    fn spawn_run(
        pipeline: &Arc<Pipeline>,
        config: &Config,
    ) -> (
        tokio::sync::oneshot::Sender<()>,
        tokio::task::JoinHandle<Result<()>>,
    ) {
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let pipeline = Arc::clone(pipeline);
        let config = config.clone();
        let task = tokio::spawn(async move {
            run(pipeline, &config, async {
                let _ = stop_rx.await;
            })
            .await
        });
        (stop_tx, task)
    }

    async fn wait_for(store: &InMemoryStore, filename: &str, within: Duration) -> bool {
        let deadline = Instant::now() + within;
        while Instant::now() < deadline {
            if store.get(filename).await.unwrap().is_some() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    #[tokio::test]
    async fn rescan_indexes_supported_files_only() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.pdf"), "alpha").unwrap();
        fs::create_dir(tmp.path().join("sub")).unwrap();
        fs::write(tmp.path().join("sub/b.png"), "beta").unwrap();
        fs::write(tmp.path().join("readme.txt"), "never").unwrap();
        let config = Config::minimal(tmp.path());
        let (store, _extractor, pipeline) = pipeline();

        let first = rescan_once(&pipeline, &config.watch).await.unwrap();
        assert_eq!(first.seen, 2);
        assert_eq!(first.indexed, 2);

        let second = rescan_once(&pipeline, &config.watch).await.unwrap();
        assert_eq!(second.unchanged, 2);
        assert_eq!(store.upsert_count(), 2);
        assert!(store.get("readme.txt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rescan_prunes_deleted_paths() {
        let tmp = TempDir::new().unwrap();
        let doomed = tmp.path().join("doomed.jpg");
        fs::write(&doomed, "short lived").unwrap();
        let config = Config::minimal(tmp.path());
        let (store, _extractor, pipeline) = pipeline();

        rescan_once(&pipeline, &config.watch).await.unwrap();
        assert_eq!(pipeline.ledger().len(), 1);

        fs::remove_file(&doomed).unwrap();
        let summary = rescan_once(&pipeline, &config.watch).await.unwrap();
        assert_eq!(summary.pruned, 1);
        assert!(pipeline.ledger().is_empty());
        // The index keeps what was extracted.
        assert!(store.get("doomed.jpg").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn run_picks_up_files_and_stops_on_shutdown() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("existing.pdf"), "present at startup").unwrap();
        let mut config = Config::minimal(tmp.path());
        config.watch.rescan_interval_secs = 1;
        config.watch.settle_delay_ms = 10;
        let (store, _extractor, pipeline) = pipeline();
        let (stop_tx, task) = spawn_run(&pipeline, &config);

        // Either the watcher or the next rescan must find it.
        tokio::time::sleep(Duration::from_millis(200)).await;
        fs::write(tmp.path().join("later.png"), "dropped in later").unwrap();

        assert!(
            wait_for(&store, "later.png", Duration::from_secs(5)).await,
            "later.png was never indexed"
        );
        assert!(store.get("existing.pdf").await.unwrap().is_some());

        stop_tx.send(()).unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn slow_copy_is_extracted_once_with_full_content() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::minimal(tmp.path());
        config.watch.rescan_interval_secs = 3600;
        config.watch.settle_delay_ms = 300;
        let (store, extractor, pipeline) = pipeline();
        let (stop_tx, task) = spawn_run(&pipeline, &config);
        tokio::time::sleep(Duration::from_millis(200)).await;

        let path = tmp.path().join("big.pdf");
        let mut file = fs::File::create(&path).unwrap();
        for i in 0..15 {
            write!(file, "chunk{} ", i).unwrap();
            file.flush().unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        drop(file);

        assert!(
            wait_for(&store, "big.pdf", Duration::from_secs(10)).await,
            "big.pdf was never indexed"
        );
        // Give a second evaluation every chance to show up.
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.upsert_count(), 1);
        let content = store.get("big.pdf").await.unwrap().unwrap().content;
        assert!(content.starts_with("chunk0 "));
        assert!(content.ends_with("chunk14 "));

        stop_tx.send(()).unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn events_are_handled_while_a_rescan_is_stuck() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("slow.pdf"), "takes forever").unwrap();
        let mut config = Config::minimal(tmp.path());
        config.watch.rescan_interval_secs = 1;
        config.watch.settle_delay_ms = 10;

        let store = Arc::new(InMemoryStore::new());
        let extractor = Arc::new(StallingExtractor::default());
        let pipeline = Arc::new(Pipeline::new(store.clone(), extractor.clone(), 2));
        let (stop_tx, task) = spawn_run(&pipeline, &config);

        // The initial scan sees slow.pdf as blank; the first rescan retries
        // it and stalls inside extraction.
        let deadline = Instant::now() + Duration::from_secs(5);
        while extractor.slow_calls.load(Ordering::SeqCst) < 2 {
            assert!(Instant::now() < deadline, "rescan never reached slow.pdf");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        fs::write(tmp.path().join("fast.png"), "right away").unwrap();
        let indexed = wait_for(&store, "fast.png", Duration::from_secs(3)).await;
        assert!(store.get("slow.pdf").await.unwrap().is_none());

        extractor.released.store(true, Ordering::SeqCst);
        stop_tx.send(()).unwrap();
        task.await.unwrap().unwrap();
        assert!(indexed, "fast.png waited behind the stuck rescan");
    }
}
