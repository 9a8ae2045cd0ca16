//! Filtering of change events before they reach the normalizer.
//!
//! Filters run on the watch backend's callback thread, so they only look at
//! the event's path and directory flag and never touch the filesystem.
//!
//! # Design
//!
//! The [`FileFilter`] trait is a predicate over a changed path. The main
//! implementation is [`PatternFilter`], which applies include and ignore glob
//! patterns the way the watch configuration describes them:
//!
//! 1. Directory events are dropped when `ignore_directories` is set.
//! 2. A path matching any ignore pattern is dropped.
//! 3. Otherwise the path is accepted if there are no include patterns, or if
//!    it matches at least one of them.
//!
//! Patterns are matched against the whole path and `*` may cross `/`, so
//! `*.flac` matches `/music/album/01.flac`.
//!
//! # Examples
//!
//! ```
//! use bw_watcher::{FileFilter, PatternFilter};
//! use camino::Utf8Path;
//!
//! let filter = PatternFilter::builder()
//!     .patterns(["*.flac", "*.mp3"])
//!     .ignore_patterns(["*/.incomplete/*"])
//!     .build()
//!     .unwrap();
//!
//! assert!(filter.should_process(Utf8Path::new("/music/a/01.flac"), false));
//! assert!(!filter.should_process(Utf8Path::new("/music/a/cover.jpg"), false));
//! assert!(!filter.should_process(Utf8Path::new("/music/.incomplete/01.flac"), false));
//! ```

use bw_core::WatchConfig;
use camino::Utf8Path;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use smallvec::SmallVec;

use crate::error::WatchError;

/// A filter for determining which change events to forward.
///
/// # Thread Safety
///
/// Filters must be [`Send`] and [`Sync`] because they are called from the
/// watch backend's thread, and `'static` because they are moved into its
/// event handler.
///
/// # Examples
///
/// ```
/// use bw_watcher::FileFilter;
/// use camino::Utf8Path;
///
/// struct NoHiddenFiles;
///
/// impl FileFilter for NoHiddenFiles {
///     fn should_process(&self, path: &Utf8Path, _is_directory: bool) -> bool {
///         !path.file_name().is_some_and(|name| name.starts_with('.'))
///     }
/// }
/// ```
pub trait FileFilter: Send + Sync + 'static {
    /// Returns `true` if the change at `path` should be forwarded.
    fn should_process(&self, path: &Utf8Path, is_directory: bool) -> bool;
}

/// A filter that accepts every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllFilter;

impl FileFilter for AcceptAllFilter {
    #[inline]
    fn should_process(&self, _path: &Utf8Path, _is_directory: bool) -> bool {
        true
    }
}

/// Include/ignore glob filtering with optional directory suppression.
///
/// Build one with [`PatternFilter::builder`] or straight from a
/// [`WatchConfig`] with [`PatternFilter::from_config`].
#[derive(Debug, Clone)]
pub struct PatternFilter {
    include: Option<GlobSet>,
    ignore: GlobSet,
    ignore_directories: bool,
}

impl PatternFilter {
    /// Returns a builder with no patterns, directories allowed, and
    /// case-sensitive matching.
    #[must_use]
    pub fn builder() -> PatternFilterBuilder {
        PatternFilterBuilder::default()
    }

    /// Builds the filter described by the watch configuration.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Pattern`] if a pattern is not a valid glob.
    pub fn from_config(config: &WatchConfig) -> Result<Self, WatchError> {
        let mut builder = Self::builder()
            .ignore_directories(config.ignore_directories)
            .case_sensitive(config.case_sensitive);
        if let Some(patterns) = &config.patterns {
            builder = builder.patterns(patterns);
        }
        if let Some(ignore_patterns) = &config.ignore_patterns {
            builder = builder.ignore_patterns(ignore_patterns);
        }
        builder.build()
    }
}

impl FileFilter for PatternFilter {
    fn should_process(&self, path: &Utf8Path, is_directory: bool) -> bool {
        if self.ignore_directories && is_directory {
            return false;
        }
        if self.ignore.is_match(path.as_std_path()) {
            return false;
        }
        self.include
            .as_ref()
            .is_none_or(|include| include.is_match(path.as_std_path()))
    }
}

/// Builder for [`PatternFilter`].
#[derive(Debug, Clone)]
pub struct PatternFilterBuilder {
    patterns: Option<SmallVec<[String; 4]>>,
    ignore_patterns: SmallVec<[String; 4]>,
    ignore_directories: bool,
    case_sensitive: bool,
}

impl Default for PatternFilterBuilder {
    fn default() -> Self {
        Self {
            patterns: None,
            ignore_patterns: SmallVec::new(),
            ignore_directories: false,
            case_sensitive: true,
        }
    }
}

impl PatternFilterBuilder {
    /// Restricts events to paths matching at least one of `patterns`.
    ///
    /// Calling this with an empty list accepts nothing.
    #[must_use]
    pub fn patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.patterns
            .get_or_insert_with(SmallVec::new)
            .extend(patterns.into_iter().map(|p| p.as_ref().to_owned()));
        self
    }

    /// Drops events for paths matching any of `patterns`.
    #[must_use]
    pub fn ignore_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.ignore_patterns
            .extend(patterns.into_iter().map(|p| p.as_ref().to_owned()));
        self
    }

    /// Drops directory events when `true`.
    #[must_use]
    pub const fn ignore_directories(mut self, ignore: bool) -> Self {
        self.ignore_directories = ignore;
        self
    }

    /// Sets whether patterns match case-sensitively.
    #[must_use]
    pub const fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    /// Compiles the patterns.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Pattern`] naming the first invalid pattern.
    pub fn build(self) -> Result<PatternFilter, WatchError> {
        let include = self
            .patterns
            .as_deref()
            .map(|patterns| compile(patterns, self.case_sensitive))
            .transpose()?;
        let ignore = compile(&self.ignore_patterns, self.case_sensitive)?;
        Ok(PatternFilter {
            include,
            ignore,
            ignore_directories: self.ignore_directories,
        })
    }
}

fn compile(patterns: &[String], case_sensitive: bool) -> Result<GlobSet, WatchError> {
    let mut set = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .case_insensitive(!case_sensitive)
            .build()
            .map_err(|source| WatchError::Pattern {
                pattern: pattern.clone(),
                source,
            })?;
        set.add(glob);
    }
    set.build().map_err(|source| WatchError::Pattern {
        pattern: patterns.join(", "),
        source,
    })
}

/// A composite filter that combines multiple filters with AND logic.
///
/// # Examples
///
/// ```
/// use bw_watcher::{CompositeFilter, FileFilter, PatternFilter};
/// use camino::Utf8Path;
///
/// struct NoHiddenFiles;
/// impl FileFilter for NoHiddenFiles {
///     fn should_process(&self, path: &Utf8Path, _is_directory: bool) -> bool {
///         !path.file_name().is_some_and(|name| name.starts_with('.'))
///     }
/// }
///
/// let filter = CompositeFilter::new()
///     .and(PatternFilter::builder().patterns(["*.flac"]).build().unwrap())
///     .and(NoHiddenFiles);
///
/// assert!(filter.should_process(Utf8Path::new("/music/a/01.flac"), false));
/// assert!(!filter.should_process(Utf8Path::new("/music/a/.01.flac"), false));
/// ```
pub struct CompositeFilter {
    filters: Vec<Box<dyn FileFilter>>,
}

impl CompositeFilter {
    /// Creates a new empty composite filter, which accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
        }
    }

    /// Adds a filter to the composite.
    #[must_use]
    pub fn and<F: FileFilter>(mut self, filter: F) -> Self {
        self.filters.push(Box::new(filter));
        self
    }
}

impl Default for CompositeFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl FileFilter for CompositeFilter {
    fn should_process(&self, path: &Utf8Path, is_directory: bool) -> bool {
        self.filters
            .iter()
            .all(|f| f.should_process(path, is_directory))
    }
}

impl<F: FileFilter + ?Sized> FileFilter for Box<F> {
    fn should_process(&self, path: &Utf8Path, is_directory: bool) -> bool {
        (**self).should_process(path, is_directory)
    }
}

impl<F: FileFilter + ?Sized> FileFilter for std::sync::Arc<F> {
    fn should_process(&self, path: &Utf8Path, is_directory: bool) -> bool {
        (**self).should_process(path, is_directory)
    }
}
