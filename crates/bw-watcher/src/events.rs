//! Change events and their normalization to directories.
//!
//! The watch subscription reports individual files and directories; the
//! debounce loop works on directories. This module bridges the two.
//!
//! # Event Flow
//!
//! ```text
//! notify event (file or directory)
//!        │
//!        ▼
//!   ChangeEvent { path, is_directory }
//!        │  normalize()
//!        ▼
//!   CanonicalDirectory  ──put──►  aggregation queue
//! ```

use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};

use crate::queue::QueueSender;

/// The kind of change reported by the watch subscription.
///
/// Only creation and modification reach the normalizer; moves and
/// deletions are not forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// A file or directory was created.
    Created,
    /// A file or directory was modified.
    Modified,
}

/// A single filesystem change with a UTF-8 path guarantee.
///
/// # Examples
///
/// ```
/// use bw_watcher::{ChangeEvent, ChangeKind};
/// use camino::Utf8PathBuf;
///
/// let event = ChangeEvent::file(Utf8PathBuf::from("/music/album/01.flac"), ChangeKind::Created);
/// assert!(!event.is_directory);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Absolute path of the changed item.
    pub path: Utf8PathBuf,

    /// Whether the changed item is a directory.
    pub is_directory: bool,

    /// What happened to the item.
    pub kind: ChangeKind,
}

impl ChangeEvent {
    /// Creates a change event.
    #[inline]
    #[must_use]
    pub const fn new(path: Utf8PathBuf, is_directory: bool, kind: ChangeKind) -> Self {
        Self {
            path,
            is_directory,
            kind,
        }
    }

    /// Creates a change event for a file.
    #[inline]
    #[must_use]
    pub const fn file(path: Utf8PathBuf, kind: ChangeKind) -> Self {
        Self::new(path, false, kind)
    }

    /// Creates a change event for a directory.
    #[inline]
    #[must_use]
    pub const fn directory(path: Utf8PathBuf, kind: ChangeKind) -> Self {
        Self::new(path, true, kind)
    }
}

/// The directory a change event is attributed to.
///
/// This is the unit placed on the aggregation queue and collected by the
/// debounce loop.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CanonicalDirectory(Utf8PathBuf);

impl CanonicalDirectory {
    /// Wraps a directory path.
    #[inline]
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self(path.into())
    }

    /// Returns the directory path.
    #[inline]
    #[must_use]
    pub fn as_path(&self) -> &Utf8Path {
        &self.0
    }

    /// Consumes the wrapper and returns the path.
    #[inline]
    #[must_use]
    pub fn into_path_buf(self) -> Utf8PathBuf {
        self.0
    }

    /// Returns `true` if the directory currently exists on disk.
    #[inline]
    #[must_use]
    pub fn exists(&self) -> bool {
        self.0.exists()
    }
}

impl AsRef<Utf8Path> for CanonicalDirectory {
    fn as_ref(&self) -> &Utf8Path {
        &self.0
    }
}

impl From<Utf8PathBuf> for CanonicalDirectory {
    fn from(path: Utf8PathBuf) -> Self {
        Self(path)
    }
}

impl fmt::Display for CanonicalDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Maps a change event to its directory.
///
/// Directories map to themselves and files to their parent. A bare relative
/// file name has an empty parent, which never exists on disk and so is never
/// imported. Only a path with no parent at all (`/` or the empty path) is
/// passed through unchanged. The filesystem is not consulted.
///
/// # Examples
///
/// ```
/// use bw_watcher::{normalize, ChangeEvent, ChangeKind};
/// use camino::Utf8PathBuf;
///
/// let file = ChangeEvent::file(Utf8PathBuf::from("/music/album/01.flac"), ChangeKind::Modified);
/// assert_eq!(normalize(&file).as_path(), "/music/album");
///
/// let dir = ChangeEvent::directory(Utf8PathBuf::from("/music/album"), ChangeKind::Created);
/// assert_eq!(normalize(&dir).as_path(), "/music/album");
/// ```
#[must_use]
pub fn normalize(event: &ChangeEvent) -> CanonicalDirectory {
    if event.is_directory {
        return CanonicalDirectory::new(event.path.clone());
    }
    CanonicalDirectory::new(event.path.parent().unwrap_or(event.path.as_path()))
}

/// Normalizes change events and enqueues the result.
///
/// Runs on the watch backend's callback thread. Enqueueing never blocks;
/// if the debounce loop has gone away the directory is dropped.
#[derive(Debug, Clone)]
pub struct EventNormalizer {
    sender: QueueSender,
}

impl EventNormalizer {
    /// Creates a normalizer feeding the given queue.
    #[must_use]
    pub const fn new(sender: QueueSender) -> Self {
        Self { sender }
    }

    /// Normalizes `event` and puts the directory on the queue.
    pub fn handle(&self, event: &ChangeEvent) {
        let directory = normalize(event);
        tracing::trace!(path = %event.path, directory = %directory, kind = ?event.kind, "Queued change");
        if self.sender.put(directory).is_err() {
            tracing::debug!(path = %event.path, "Aggregation queue closed, dropping change");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{Received, aggregation_queue};
    use std::time::Duration;

    #[test]
    fn test_normalize_file_to_parent() {
        let event = ChangeEvent::file(Utf8PathBuf::from("/music/a/b/track.mp3"), ChangeKind::Created);
        assert_eq!(normalize(&event), CanonicalDirectory::new("/music/a/b"));
    }

    #[test]
    fn test_normalize_directory_unchanged() {
        let event = ChangeEvent::directory(Utf8PathBuf::from("/music/a/b"), ChangeKind::Modified);
        assert_eq!(normalize(&event), CanonicalDirectory::new("/music/a/b"));
    }

    #[test]
    fn test_normalize_parentless_paths() {
        let root = ChangeEvent::file(Utf8PathBuf::from("/"), ChangeKind::Modified);
        assert_eq!(normalize(&root).as_path(), "/");

        let bare = ChangeEvent::file(Utf8PathBuf::from("track.mp3"), ChangeKind::Modified);
        let directory = normalize(&bare);
        assert_eq!(directory.as_path(), "");
        assert!(!directory.exists());

        let empty = ChangeEvent::file(Utf8PathBuf::new(), ChangeKind::Created);
        assert_eq!(normalize(&empty).as_path(), "");
    }

    #[test]
    fn test_normalize_does_not_touch_filesystem() {
        let event = ChangeEvent::file(
            Utf8PathBuf::from("/definitely/not/here/file.flac"),
            ChangeKind::Created,
        );
        assert_eq!(normalize(&event).as_path(), "/definitely/not/here");
    }

    #[test]
    fn test_canonical_directory_display() {
        let dir = CanonicalDirectory::new("/music/album");
        assert_eq!(dir.to_string(), "/music/album");
        assert_eq!(dir.into_path_buf(), Utf8PathBuf::from("/music/album"));
    }

    #[tokio::test]
    async fn test_normalizer_enqueues_directory() {
        let (sender, mut receiver) = aggregation_queue();
        let normalizer = EventNormalizer::new(sender);

        normalizer.handle(&ChangeEvent::file(
            Utf8PathBuf::from("/music/album/01.flac"),
            ChangeKind::Created,
        ));

        let received = receiver.get(Duration::from_secs(1)).await;
        assert_eq!(received, Received::Item(CanonicalDirectory::new("/music/album")));
    }

    #[test]
    fn test_normalizer_ignores_closed_queue() {
        let (sender, receiver) = aggregation_queue();
        drop(receiver);
        let normalizer = EventNormalizer::new(sender);

        normalizer.handle(&ChangeEvent::file(
            Utf8PathBuf::from("/music/album/01.flac"),
            ChangeKind::Created,
        ));
    }
}
