//! Watch subscription over one or more root directories.
//!
//! This module provides [`WatchSubscription`], an adapter around the `notify`
//! crate. It reports creation and modification events as [`ChangeEvent`]s to
//! a plain callback, after applying a [`FileFilter`].
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                 notify backend thread                        │
//! │  ┌──────────────────┐   ┌──────────────┐   ┌─────────────┐   │
//! │  │ RecommendedWatcher│ → │ classify +   │ → │ callback    │   │
//! │  │ (N roots)        │   │ FileFilter   │   │ (normalizer)│   │
//! │  └──────────────────┘   └──────────────┘   └──────┬──────┘   │
//! └───────────────────────────────────────────────────│──────────┘
//!                                                     │ put (never blocks)
//!                                                     ▼
//!                                          aggregation queue → debounce loop
//! ```
//!
//! The callback runs on the backend's thread. Whether an item is a directory
//! is read from the event kind when the backend reports it (`CreateKind`),
//! and from a single `lstat` otherwise. Existence checks for the debounce
//! decision happen later, in the debounce loop.

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use notify::event::{CreateKind, ModifyKind};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};

use crate::error::WatchError;
use crate::events::{ChangeEvent, ChangeKind};
use crate::filter::FileFilter;

/// Options for a [`WatchSubscription`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionOptions {
    /// Whether each root is watched recursively.
    pub recursive: bool,

    /// Polling granularity for backends that poll.
    pub poll_interval: Duration,
}

impl Default for SubscriptionOptions {
    fn default() -> Self {
        Self {
            recursive: true,
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// An active watch over a set of root directories.
///
/// Watching stops when the subscription is dropped.
///
/// # Examples
///
/// ```no_run
/// use bw_watcher::{AcceptAllFilter, SubscriptionOptions, WatchSubscription};
/// use camino::Utf8PathBuf;
///
/// # fn example() -> Result<(), bw_watcher::WatchError> {
/// let subscription = WatchSubscription::start(
///     &[Utf8PathBuf::from("/music/incoming")],
///     SubscriptionOptions::default(),
///     AcceptAllFilter,
///     |event| println!("changed: {} (dir: {})", event.path, event.is_directory),
/// )?;
///
/// println!("watching {:?}", subscription.roots());
/// # Ok(())
/// # }
/// ```
pub struct WatchSubscription {
    /// Kept alive for the lifetime of the subscription.
    watcher: RecommendedWatcher,

    /// Canonical roots, sorted.
    roots: Vec<Utf8PathBuf>,

    options: SubscriptionOptions,
}

impl std::fmt::Debug for WatchSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchSubscription")
            .field("roots", &self.roots)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl WatchSubscription {
    /// Starts watching `roots`, reporting filtered changes to `callback`.
    ///
    /// Each root is validated and canonicalized before anything is watched,
    /// so a bad root fails the whole subscription.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::PathNotFound`] if a root doesn't exist, or
    /// [`WatchError::Notify`] if the backend fails to initialize.
    pub fn start<F, C>(
        roots: &[Utf8PathBuf],
        options: SubscriptionOptions,
        filter: F,
        callback: C,
    ) -> Result<Self, WatchError>
    where
        F: FileFilter,
        C: Fn(ChangeEvent) + Send + 'static,
    {
        let mut canonical = Vec::with_capacity(roots.len());
        for root in roots {
            if !root.exists() {
                return Err(WatchError::path_not_found(root.as_path()));
            }
            canonical.push(root.canonicalize_utf8()?);
        }
        canonical.sort();
        canonical.dedup();

        let config = notify::Config::default().with_poll_interval(options.poll_interval);
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| match res {
                Ok(event) => dispatch(event, &filter, &callback),
                Err(error) => tracing::warn!(error = %error, "Watch backend error"),
            },
            config,
        )?;

        let mode = if options.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        for root in &canonical {
            watcher.watch(root.as_std_path(), mode)?;
            tracing::info!(path = %root, recursive = options.recursive, "Watching directory");
        }

        Ok(Self {
            watcher,
            roots: canonical,
            options,
        })
    }

    /// Returns the canonical watch roots.
    #[must_use]
    pub fn roots(&self) -> &[Utf8PathBuf] {
        &self.roots
    }

    /// Returns the options this subscription was started with.
    #[must_use]
    pub const fn options(&self) -> SubscriptionOptions {
        self.options
    }

    /// Stops watching a single root.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Notify`] if the root was not being watched.
    pub fn unwatch(&mut self, root: &Utf8Path) -> Result<(), WatchError> {
        self.watcher.unwatch(root.as_std_path())?;
        self.roots.retain(|r| r.as_path() != root);
        tracing::info!(path = %root, "Stopped watching directory");
        Ok(())
    }
}

/// Maps a notify event kind to a change kind.
///
/// Returns `None` for kinds that are not forwarded.
fn classify(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(_) => Some(ChangeKind::Created),
        EventKind::Modify(ModifyKind::Name(_)) => None,
        EventKind::Modify(_) => Some(ChangeKind::Modified),
        EventKind::Any | EventKind::Access(_) | EventKind::Remove(_) | EventKind::Other => None,
    }
}

/// Returns whether `path` names a directory.
///
/// Creation events usually say so; modification events never do, so the
/// path is inspected without following symlinks. A path that is already
/// gone counts as a file.
fn detect_directory(kind: &EventKind, path: &Utf8Path) -> bool {
    match kind {
        EventKind::Create(CreateKind::Folder) => true,
        EventKind::Create(CreateKind::File) => false,
        _ => path.symlink_metadata().is_ok_and(|m| m.is_dir()),
    }
}

fn dispatch<F, C>(event: notify::Event, filter: &F, callback: &C)
where
    F: FileFilter,
    C: Fn(ChangeEvent),
{
    let Some(kind) = classify(&event.kind) else {
        return;
    };

    for path in event.paths {
        let path = match Utf8PathBuf::try_from(path) {
            Ok(p) => p,
            Err(e) => {
                let invalid = WatchError::non_utf8_path(e.into_path_buf());
                tracing::warn!(error = %invalid, "Skipping change event");
                continue;
            }
        };

        let is_directory = detect_directory(&event.kind, &path);
        if !filter.should_process(&path, is_directory) {
            tracing::trace!(path = %path, is_directory, "Filtered out change event");
            continue;
        }

        callback(ChangeEvent::new(path, is_directory, kind));
    }
}
