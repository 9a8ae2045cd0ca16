//! Error types for the bw-watcher crate.
//!
//! This module provides the [`WatchError`] type for errors that can occur
//! while setting up a watch session or moving events through it.

use camino::Utf8PathBuf;

/// Errors that can occur during watch operations.
///
/// # Error Recovery Strategy
///
/// - **Notify errors** ([`WatchError::Notify`]): Fatal - propagate immediately
/// - **Path not found** ([`WatchError::PathNotFound`]): Fatal - roots must exist
/// - **Invalid pattern** ([`WatchError::Pattern`]): Fatal - reported before watching
/// - **Channel closed** ([`WatchError::ChannelClosed`]): Fatal - the debounce loop is gone
/// - **Non-UTF-8 path** ([`WatchError::NonUtf8Path`]): Recoverable - skip and continue
/// - **I/O errors** ([`WatchError::Io`]): Fatal - propagate immediately
///
/// # Examples
///
/// ```
/// use bw_watcher::WatchError;
///
/// fn handle_error(err: WatchError) {
///     match err {
///         WatchError::Notify(e) => eprintln!("Notify error: {e}"),
///         WatchError::PathNotFound(p) => eprintln!("Path not found: {p}"),
///         WatchError::Pattern { pattern, .. } => eprintln!("Bad pattern: {pattern}"),
///         WatchError::ChannelClosed => eprintln!("Channel closed"),
///         WatchError::NonUtf8Path(p) => eprintln!("Invalid path: {}", p.display()),
///         WatchError::Io(e) => eprintln!("I/O error: {e}"),
///     }
/// }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// Failed to initialize or operate the notify watcher.
    #[error("notify watcher error: {0}")]
    Notify(#[from] notify::Error),

    /// A watch root does not exist.
    #[error("path does not exist: {0}")]
    PathNotFound(Utf8PathBuf),

    /// An include or ignore pattern is not a valid glob.
    #[error("invalid glob pattern '{pattern}': {source}")]
    Pattern {
        /// The pattern as written in the configuration.
        pattern: String,
        /// The underlying glob error.
        #[source]
        source: globset::Error,
    },

    /// The aggregation queue was closed.
    ///
    /// The debounce loop owning the receiving side has stopped.
    #[error("aggregation queue closed")]
    ChannelClosed,

    /// A path is not valid UTF-8.
    ///
    /// Events for such paths are logged and skipped.
    #[error("path is not valid UTF-8: {}", _0.display())]
    NonUtf8Path(std::path::PathBuf),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WatchError {
    /// Creates a new [`WatchError::PathNotFound`] error.
    #[inline]
    pub fn path_not_found(path: impl Into<Utf8PathBuf>) -> Self {
        Self::PathNotFound(path.into())
    }

    /// Creates a new [`WatchError::NonUtf8Path`] error.
    #[inline]
    pub fn non_utf8_path(path: impl Into<std::path::PathBuf>) -> Self {
        Self::NonUtf8Path(path.into())
    }

    /// Returns `true` if this error is recoverable (watching can continue).
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::NonUtf8Path(_))
    }

    /// Returns `true` if this error is fatal (watching should stop).
    #[inline]
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }

    /// Returns the watch root associated with this error, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Utf8PathBuf> {
        match self {
            Self::PathNotFound(path) => Some(path),
            Self::Notify(_)
            | Self::Pattern { .. }
            | Self::ChannelClosed
            | Self::NonUtf8Path(_)
            | Self::Io(_) => None,
        }
    }
}
