//! The debounce loop: collects changed directories and imports them in
//! batches once the watched trees go quiet.
//!
//! # State Machine
//!
//! ```text
//!            item (add / remove / ignore)
//!              ┌──────────┐
//!              ▼          │
//! ┌──────────────────────────────┐  back-off elapsed,  ┌────────────────┐
//! │ wait on queue (back_off)     │ ──────────────────► │ flush pending  │
//! │                              │   pending non-empty │ to import sink │
//! └──────────────────────────────┘ ◄────────────────── └────────────────┘
//!              │                      clear pending (success or failure)
//!              │ queue closed
//!              ▼
//!            stop
//! ```
//!
//! Every received directory restarts the back-off wait, so a tree that keeps
//! changing (a long copy, say) is only imported once it has been quiet for
//! the whole window.
//!
//! On each received directory:
//!
//! - not pending, not a watch root, exists on disk: add it
//! - pending and no longer on disk: remove it
//! - anything else: ignore it
//!
//! Delivery is at most once. A failed import is logged and its batch is
//! dropped, not retried.

use std::fmt;
use std::time::Duration;

use bw_core::{FxHashSet, fx_hash_set};
use camino::{Utf8Path, Utf8PathBuf};
use smallvec::SmallVec;
use tracing::{Instrument as _, Span, debug, info, trace, warn};

use crate::events::CanonicalDirectory;
use crate::queue::{QueueReceiver, Received};
use crate::sink::{ImportError, ImportSink};

/// Directories collected since the last flush.
///
/// Owned and mutated only by the debounce loop.
#[derive(Debug, Clone, Default)]
pub struct PendingSet {
    directories: FxHashSet<CanonicalDirectory>,
}

impl PendingSet {
    /// Creates an empty pending set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            directories: fx_hash_set(),
        }
    }

    /// Adds a directory; returns `false` if it was already pending.
    pub fn insert(&mut self, directory: CanonicalDirectory) -> bool {
        self.directories.insert(directory)
    }

    /// Removes a directory; returns `false` if it wasn't pending.
    pub fn remove(&mut self, directory: &CanonicalDirectory) -> bool {
        self.directories.remove(directory)
    }

    /// Returns `true` if the directory is pending.
    #[must_use]
    pub fn contains(&self, directory: &CanonicalDirectory) -> bool {
        self.directories.contains(directory)
    }

    /// Returns the number of pending directories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.directories.len()
    }

    /// Returns `true` if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.directories.is_empty()
    }

    /// Takes an immutable, sorted snapshot of the pending directories.
    #[must_use]
    pub fn snapshot(&self) -> Batch {
        self.directories.iter().cloned().collect()
    }

    /// Removes every pending directory.
    pub fn clear(&mut self) {
        self.directories.clear();
    }
}

/// A finalized set of directories handed to the import sink.
///
/// Directories are unique and sorted, so the same pending set always
/// produces the same batch.
///
/// # Memory Efficiency
///
/// Uses [`SmallVec`] with inline storage for up to 8 directories, avoiding
/// heap allocation for the common case of a handful of new albums.
///
/// # Examples
///
/// ```
/// use bw_watcher::{Batch, CanonicalDirectory};
///
/// let batch: Batch = ["/music/b", "/music/a", "/music/b"]
///     .into_iter()
///     .map(CanonicalDirectory::new)
///     .collect();
///
/// assert_eq!(batch.len(), 2);
/// assert_eq!(batch.to_string(), "[/music/a, /music/b]");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    directories: SmallVec<[CanonicalDirectory; 8]>,
}

impl Batch {
    /// Returns the number of directories in the batch.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.directories.len()
    }

    /// Returns `true` if the batch is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.directories.is_empty()
    }

    /// Returns an iterator over the directories in sorted order.
    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, CanonicalDirectory> {
        self.directories.iter()
    }

    /// Returns an iterator over the directory paths.
    pub fn paths(&self) -> impl Iterator<Item = &Utf8Path> {
        self.directories.iter().map(CanonicalDirectory::as_path)
    }

    /// Returns `true` if the batch contains `path`.
    #[must_use]
    pub fn contains(&self, path: &Utf8Path) -> bool {
        self.paths().any(|p| p == path)
    }
}

impl FromIterator<CanonicalDirectory> for Batch {
    fn from_iter<T: IntoIterator<Item = CanonicalDirectory>>(iter: T) -> Self {
        let mut directories: SmallVec<[CanonicalDirectory; 8]> = iter.into_iter().collect();
        directories.sort_unstable();
        directories.dedup();
        Self { directories }
    }
}

impl<'a> IntoIterator for &'a Batch {
    type Item = &'a CanonicalDirectory;
    type IntoIter = std::slice::Iter<'a, CanonicalDirectory>;

    fn into_iter(self) -> Self::IntoIter {
        self.directories.iter()
    }
}

impl fmt::Display for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, dir) in self.directories.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{dir}")?;
        }
        f.write_str("]")
    }
}

/// What a single [`DebounceLoop::step`] did.
#[derive(Debug)]
pub enum Step {
    /// The directory was added to the pending set.
    Added(CanonicalDirectory),
    /// The directory vanished from disk and was removed from the pending set.
    Removed(CanonicalDirectory),
    /// The directory was already pending, is a watch root, or doesn't exist.
    Ignored(CanonicalDirectory),
    /// The back-off elapsed and the pending set was handed to the sink.
    Flushed {
        /// The batch that was imported.
        batch: Batch,
        /// The sink's result; the pending set is cleared either way.
        outcome: Result<(), ImportError>,
    },
    /// The back-off elapsed with nothing pending.
    Idle,
    /// Every producer is gone and the queue is drained.
    Closed,
}

/// Counters reported when [`DebounceLoop::run`] returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopSummary {
    /// Batches handed to the sink.
    pub flushes: usize,
    /// Batches the sink failed to import.
    pub failed_imports: usize,
    /// Directories still pending when the queue closed.
    pub discarded: usize,
}

/// The debounce state machine.
///
/// Owns the pending set, the consuming end of the aggregation queue, and the
/// import sink. Log events are emitted inside the span given to
/// [`with_span`](Self::with_span).
///
/// # Examples
///
/// ```no_run
/// use bw_watcher::{aggregation_queue, Batch, DebounceLoop, ImportError};
/// use camino::Utf8PathBuf;
/// use std::time::Duration;
///
/// # async fn example() {
/// let (sender, receiver) = aggregation_queue();
/// let sink = |batch: &Batch| -> Result<(), ImportError> {
///     println!("importing {batch}");
///     Ok(())
/// };
///
/// let debounce = DebounceLoop::new(
///     [Utf8PathBuf::from("/music")],
///     Duration::from_secs(30),
///     receiver,
///     sink,
/// );
///
/// // Hand `sender` to an EventNormalizer, then:
/// let summary = debounce.run().await;
/// println!("{} batches imported", summary.flushes);
/// # drop(sender);
/// # }
/// ```
pub struct DebounceLoop<S> {
    roots: FxHashSet<Utf8PathBuf>,
    back_off: Duration,
    receiver: QueueReceiver,
    sink: S,
    pending: PendingSet,
    span: Span,
    summary: LoopSummary,
}

impl<S> fmt::Debug for DebounceLoop<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebounceLoop")
            .field("roots", &self.roots)
            .field("back_off", &self.back_off)
            .field("pending", &self.pending.len())
            .field("summary", &self.summary)
            .finish_non_exhaustive()
    }
}

impl<S: ImportSink> DebounceLoop<S> {
    /// Creates a loop over `receiver` that never imports any of `roots`.
    pub fn new(
        roots: impl IntoIterator<Item = Utf8PathBuf>,
        back_off: Duration,
        receiver: QueueReceiver,
        sink: S,
    ) -> Self {
        Self {
            roots: roots.into_iter().collect(),
            back_off,
            receiver,
            sink,
            pending: PendingSet::new(),
            span: tracing::info_span!("debounce_loop"),
            summary: LoopSummary::default(),
        }
    }

    /// Emits the loop's log events inside `span`.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Returns the directories collected since the last flush.
    #[must_use]
    pub const fn pending(&self) -> &PendingSet {
        &self.pending
    }

    /// Returns the back-off window.
    #[must_use]
    pub const fn back_off(&self) -> Duration {
        self.back_off
    }

    /// Returns the counters accumulated so far.
    #[must_use]
    pub const fn summary(&self) -> LoopSummary {
        self.summary
    }

    /// Returns `true` if `directory` is one of the watch roots.
    #[must_use]
    pub fn is_root(&self, directory: &CanonicalDirectory) -> bool {
        self.roots.contains(directory.as_path())
    }

    /// Waits for the next directory or the back-off, whichever comes first,
    /// and performs the matching transition.
    pub async fn step(&mut self) -> Step {
        let span = self.span.clone();
        self.transition().instrument(span).await
    }

    /// Runs until every producer is gone.
    ///
    /// Directories still pending at that point are discarded, since the
    /// back-off never confirmed they were complete.
    pub async fn run(mut self) -> LoopSummary {
        while !matches!(self.step().await, Step::Closed) {}

        self.summary.discarded = self.pending.len();
        if !self.pending.is_empty() {
            self.span.in_scope(|| {
                info!(count = self.pending.len(), paths = %self.pending.snapshot(), "Discarding pending directories");
            });
        }
        self.span.in_scope(|| debug!(summary = ?self.summary, "Debounce loop stopped"));
        self.summary
    }

    async fn transition(&mut self) -> Step {
        match self.receiver.get(self.back_off).await {
            Received::Item(directory) => self.observe(directory),
            Received::TimedOut => self.flush().await,
            Received::Closed => Step::Closed,
        }
    }

    fn observe(&mut self, directory: CanonicalDirectory) -> Step {
        let pending = self.pending.contains(&directory);

        if !pending && !self.is_root(&directory) && directory.exists() {
            info!(path = %directory, "Adding");
            self.pending.insert(directory.clone());
            Step::Added(directory)
        } else if pending && !directory.exists() {
            info!(path = %directory, "Removing");
            self.pending.remove(&directory);
            Step::Removed(directory)
        } else {
            trace!(path = %directory, pending, "Ignoring");
            Step::Ignored(directory)
        }
    }

    async fn flush(&mut self) -> Step {
        if self.pending.is_empty() {
            return Step::Idle;
        }

        let batch = self.pending.snapshot();
        info!(count = batch.len(), paths = %batch, "Importing");

        let outcome = self.sink.import(&batch).await;
        self.summary.flushes += 1;
        if let Err(error) = &outcome {
            self.summary.failed_imports += 1;
            warn!(error = %error, paths = %batch, "Import failed");
        }

        info!(paths = %batch, "Import done");
        self.pending.clear();
        Step::Flushed { batch, outcome }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{QueueSender, aggregation_queue};
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::time::{Instant, sleep};

    const BACK_OFF: Duration = Duration::from_secs(2);

    type Imports = Arc<Mutex<Vec<(Instant, Batch)>>>;

    struct Fixture {
        _root: TempDir,
        root: Utf8PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let root = TempDir::new().expect("Failed to create temp directory");
            let path = Utf8PathBuf::try_from(root.path().to_path_buf()).expect("Invalid path");
            Self { _root: root, root: path }
        }

        fn mkdir(&self, name: &str) -> CanonicalDirectory {
            let path = self.root.join(name);
            std::fs::create_dir_all(&path).expect("Failed to create directory");
            CanonicalDirectory::new(path)
        }

        fn missing(&self, name: &str) -> CanonicalDirectory {
            CanonicalDirectory::new(self.root.join(name))
        }
    }

    fn recording_sink(imports: Imports) -> impl FnMut(&Batch) -> Result<(), ImportError> + Send {
        move |batch: &Batch| {
            imports.lock().push((Instant::now(), batch.clone()));
            Ok(())
        }
    }

    fn debounce_loop<S: ImportSink>(
        fixture: &Fixture,
        sink: S,
    ) -> (QueueSender, DebounceLoop<S>) {
        let (sender, receiver) = aggregation_queue();
        let debounce = DebounceLoop::new([fixture.root.clone()], BACK_OFF, receiver, sink);
        (sender, debounce)
    }

    fn assert_close(actual: Duration, expected: Duration) {
        let slack = Duration::from_millis(50);
        assert!(
            actual >= expected && actual <= expected + slack,
            "expected ~{expected:?}, got {actual:?}"
        );
    }

    fn batch_of(dirs: &[&CanonicalDirectory]) -> Batch {
        dirs.iter().map(|d| (*d).clone()).collect()
    }

    #[test]
    fn test_batch_is_sorted_and_unique() {
        let batch: Batch = ["/c", "/a", "/b", "/a"]
            .into_iter()
            .map(CanonicalDirectory::new)
            .collect();
        let paths: Vec<_> = batch.paths().map(Utf8Path::as_str).collect();
        assert_eq!(paths, vec!["/a", "/b", "/c"]);
        assert!(batch.contains(Utf8Path::new("/b")));
        assert!(!batch.contains(Utf8Path::new("/d")));
    }

    #[test]
    fn test_pending_set_snapshot_and_clear() {
        let mut pending = PendingSet::new();
        assert!(pending.insert(CanonicalDirectory::new("/b")));
        assert!(pending.insert(CanonicalDirectory::new("/a")));
        assert!(!pending.insert(CanonicalDirectory::new("/a")));

        let snapshot = pending.snapshot();
        assert_eq!(snapshot.to_string(), "[/a, /b]");

        pending.clear();
        assert!(pending.is_empty());
        assert_eq!(snapshot.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_adds_existing_directory() {
        let fixture = Fixture::new();
        let imports = Imports::default();
        let (sender, mut debounce) = debounce_loop(&fixture, recording_sink(Arc::clone(&imports)));
        let album = fixture.mkdir("album");

        sender.put(album.clone()).unwrap();

        assert!(matches!(debounce.step().await, Step::Added(ref d) if *d == album));
        assert!(debounce.pending().contains(&album));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ignores_watch_root() {
        let fixture = Fixture::new();
        let imports = Imports::default();
        let (sender, mut debounce) = debounce_loop(&fixture, recording_sink(Arc::clone(&imports)));

        sender.put(CanonicalDirectory::new(fixture.root.clone())).unwrap();

        assert!(matches!(debounce.step().await, Step::Ignored(_)));
        assert!(debounce.pending().is_empty());
        assert!(matches!(debounce.step().await, Step::Idle));
        assert!(imports.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ignores_missing_directory() {
        let fixture = Fixture::new();
        let imports = Imports::default();
        let (sender, mut debounce) = debounce_loop(&fixture, recording_sink(Arc::clone(&imports)));

        sender.put(fixture.missing("gone")).unwrap();

        assert!(matches!(debounce.step().await, Step::Ignored(_)));
        assert!(debounce.pending().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_directory_imported_once() {
        let fixture = Fixture::new();
        let imports = Imports::default();
        let (sender, mut debounce) = debounce_loop(&fixture, recording_sink(Arc::clone(&imports)));
        let album = fixture.mkdir("album");

        sender.put(album.clone()).unwrap();
        sender.put(album.clone()).unwrap();

        assert!(matches!(debounce.step().await, Step::Added(_)));
        assert!(matches!(debounce.step().await, Step::Ignored(_)));
        match debounce.step().await {
            Step::Flushed { batch, outcome } => {
                assert!(outcome.is_ok());
                assert_eq!(batch, batch_of(&[&album]));
            }
            other => panic!("Expected Flushed, got {other:?}"),
        }
        assert_eq!(imports.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_removes_directory_deleted_before_flush() {
        let fixture = Fixture::new();
        let imports = Imports::default();
        let (sender, mut debounce) = debounce_loop(&fixture, recording_sink(Arc::clone(&imports)));
        let album = fixture.mkdir("album");

        sender.put(album.clone()).unwrap();
        assert!(matches!(debounce.step().await, Step::Added(_)));

        std::fs::remove_dir(album.as_path()).unwrap();
        sender.put(album.clone()).unwrap();

        assert!(matches!(debounce.step().await, Step::Removed(ref d) if *d == album));
        assert!(debounce.pending().is_empty());
        assert!(matches!(debounce.step().await, Step::Idle));
        assert!(imports.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_never_imports() {
        let fixture = Fixture::new();
        let imports = Imports::default();
        let (_sender, mut debounce) = debounce_loop(&fixture, recording_sink(Arc::clone(&imports)));
        let start = Instant::now();

        for _ in 0..5 {
            assert!(matches!(debounce.step().await, Step::Idle));
        }

        assert!(start.elapsed() >= BACK_OFF * 5);
        assert!(imports.lock().is_empty());
        assert_eq!(debounce.summary(), LoopSummary::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_import_is_not_retried() {
        let fixture = Fixture::new();
        let attempts: Arc<Mutex<Vec<Batch>>> = Arc::default();
        let sink = {
            let attempts = Arc::clone(&attempts);
            move |batch: &Batch| -> Result<(), ImportError> {
                let mut attempts = attempts.lock();
                attempts.push(batch.clone());
                if attempts.len() == 1 {
                    Err(ImportError::other("library locked"))
                } else {
                    Ok(())
                }
            }
        };
        let (sender, mut debounce) = debounce_loop(&fixture, sink);
        let a = fixture.mkdir("a");
        let b = fixture.mkdir("b");
        let c = fixture.mkdir("c");

        sender.put(a.clone()).unwrap();
        sender.put(b.clone()).unwrap();
        debounce.step().await;
        debounce.step().await;
        match debounce.step().await {
            Step::Flushed { batch, outcome } => {
                assert!(outcome.is_err());
                assert_eq!(batch, batch_of(&[&a, &b]));
            }
            other => panic!("Expected Flushed, got {other:?}"),
        }
        assert!(debounce.pending().is_empty());

        sender.put(c.clone()).unwrap();
        debounce.step().await;
        match debounce.step().await {
            Step::Flushed { batch, outcome } => {
                assert!(outcome.is_ok());
                assert_eq!(batch, batch_of(&[&c]));
            }
            other => panic!("Expected Flushed, got {other:?}"),
        }

        assert_eq!(
            debounce.summary(),
            LoopSummary {
                flushes: 2,
                failed_imports: 1,
                discarded: 0,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_bursts_produce_two_batches() {
        let fixture = Fixture::new();
        let imports = Imports::default();
        let (sender, debounce) = debounce_loop(&fixture, recording_sink(Arc::clone(&imports)));
        let d1 = fixture.mkdir("d1");
        let d2 = fixture.mkdir("d2");
        let d3 = fixture.mkdir("d3");
        let start = Instant::now();

        sender.put(d1.clone()).unwrap();
        let handle = tokio::spawn(debounce.run());

        sleep(Duration::from_millis(500)).await;
        sender.put(d2.clone()).unwrap();

        // First flush lands at 2.5s; D3 arrives one second later.
        sleep(Duration::from_millis(3000)).await;
        sender.put(d3.clone()).unwrap();

        sleep(Duration::from_secs(3)).await;
        drop(sender);
        let summary = handle.await.unwrap();

        let imports = imports.lock();
        assert_eq!(imports.len(), 2);
        assert_eq!(imports[0].1, batch_of(&[&d1, &d2]));
        assert_close(imports[0].0 - start, Duration::from_millis(2500));
        assert_eq!(imports[1].1, batch_of(&[&d3]));
        assert_close(imports[1].0 - start, Duration::from_millis(5500));
        assert_eq!(summary.flushes, 2);
        assert_eq!(summary.discarded, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_continuous_activity_delays_flush() {
        let fixture = Fixture::new();
        let imports = Imports::default();
        let (sender, debounce) = debounce_loop(&fixture, recording_sink(Arc::clone(&imports)));
        let album = fixture.mkdir("album");
        let start = Instant::now();

        let handle = tokio::spawn(debounce.run());
        for _ in 0..6 {
            sender.put(album.clone()).unwrap();
            sleep(Duration::from_secs(1)).await;
        }
        assert!(imports.lock().is_empty());

        sleep(Duration::from_secs(3)).await;
        drop(sender);
        handle.await.unwrap();

        let imports = imports.lock();
        assert_eq!(imports.len(), 1);
        assert_close(imports[0].0 - start, Duration::from_secs(7));
    }

    /// Sink that takes a while, like a real importer.
    struct SlowSink {
        delay: Duration,
        imports: Imports,
    }

    impl ImportSink for SlowSink {
        async fn import(&mut self, batch: &Batch) -> Result<(), ImportError> {
            sleep(self.delay).await;
            self.imports.lock().push((Instant::now(), batch.clone()));
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_changes_during_import_go_to_next_batch() {
        let fixture = Fixture::new();
        let imports = Imports::default();
        let sink = SlowSink {
            delay: Duration::from_secs(10),
            imports: Arc::clone(&imports),
        };
        let (sender, debounce) = debounce_loop(&fixture, sink);
        let a = fixture.mkdir("a");
        let b = fixture.mkdir("b");
        let start = Instant::now();

        sender.put(a.clone()).unwrap();
        let handle = tokio::spawn(debounce.run());

        // Import of [a] starts at 2s and runs until 12s; b arrives mid-import.
        sleep(Duration::from_secs(7)).await;
        sender.put(b.clone()).unwrap();

        sleep(Duration::from_secs(20)).await;
        drop(sender);
        let summary = handle.await.unwrap();

        let imports = imports.lock();
        assert_eq!(imports.len(), 2);
        assert_eq!(imports[0].1, batch_of(&[&a]));
        assert_close(imports[0].0 - start, Duration::from_secs(12));
        assert_eq!(imports[1].1, batch_of(&[&b]));
        assert_close(imports[1].0 - start, Duration::from_secs(24));
        assert_eq!(
            summary,
            LoopSummary {
                flushes: 2,
                failed_imports: 0,
                discarded: 0,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_discards_pending_on_close() {
        let fixture = Fixture::new();
        let imports = Imports::default();
        let (sender, debounce) = debounce_loop(&fixture, recording_sink(Arc::clone(&imports)));

        sender.put(fixture.mkdir("half-copied")).unwrap();
        drop(sender);

        let summary = debounce
            .with_span(tracing::info_span!("test_session"))
            .run()
            .await;

        assert_eq!(summary.discarded, 1);
        assert_eq!(summary.flushes, 0);
        assert!(imports.lock().is_empty());
    }
}
