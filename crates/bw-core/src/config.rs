//! Configuration structures for batchwatch.
//!
//! This module provides configuration types for all components of the application:
//!
//! - [`WatchConfig`] - Watch roots, filters, polling timeout, and back-off window
//! - [`ImportConfig`] - The external command that receives each batch
//! - [`Config`] - Root configuration combining all settings
//!
//! All configuration types implement [`Default`] and deserialize with
//! `#[serde(default)]`, so a configuration file only needs the keys it changes.

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Configuration for the watch session.
///
/// Durations are stored as fractional seconds to keep configuration files
/// readable; use [`timeout_duration`](Self::timeout_duration) and
/// [`back_off_duration`](Self::back_off_duration) to get validated
/// [`Duration`] values.
///
/// # Examples
///
/// ```
/// use bw_core::WatchConfig;
///
/// let config = WatchConfig::default();
/// assert!(config.recursive);
/// assert!((config.back_off - 30.0).abs() < f64::EPSILON);
/// assert!(config.case_sensitive);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Root directories to watch.
    ///
    /// Ignored when paths are supplied on the command line.
    pub paths: Vec<Utf8PathBuf>,

    /// Whether each root is watched recursively.
    pub recursive: bool,

    /// Polling granularity handed to the watch backend, in seconds.
    pub timeout: f64,

    /// Quiescence window in seconds before pending directories are imported.
    pub back_off: f64,

    /// Glob patterns a changed path must match to be reported.
    ///
    /// `None` accepts every path.
    pub patterns: Option<Vec<String>>,

    /// Glob patterns that suppress a changed path.
    pub ignore_patterns: Option<Vec<String>>,

    /// Whether directory-level events are suppressed.
    pub ignore_directories: bool,

    /// Whether glob patterns are matched case-sensitively.
    pub case_sensitive: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            recursive: true,
            timeout: 1.0,
            back_off: 30.0,
            patterns: None,
            ignore_patterns: None,
            ignore_directories: false,
            case_sensitive: true,
        }
    }
}

impl WatchConfig {
    /// Returns the polling timeout as a [`Duration`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOption`] if the value is not a positive,
    /// finite number of seconds.
    pub fn timeout_duration(&self) -> Result<Duration, ConfigError> {
        positive_seconds("timeout", self.timeout)
    }

    /// Returns the back-off window as a [`Duration`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOption`] if the value is not a positive,
    /// finite number of seconds.
    pub fn back_off_duration(&self) -> Result<Duration, ConfigError> {
        positive_seconds("back_off", self.back_off)
    }

    /// Validates the numeric options.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.timeout_duration()?;
        self.back_off_duration()?;
        Ok(())
    }

    /// Resolves the set of watch roots.
    ///
    /// Paths given as `args` take precedence over the configured
    /// [`paths`](Self::paths). Relative paths are made absolute against the
    /// current directory; the result is sorted and free of duplicates.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoWatchPaths`] if neither source supplies a
    /// path, or [`ConfigError::InvalidPath`] if a path cannot be made
    /// absolute.
    ///
    /// # Examples
    ///
    /// ```
    /// use bw_core::{ConfigError, WatchConfig};
    /// use camino::Utf8PathBuf;
    ///
    /// let config = WatchConfig::default();
    /// assert!(matches!(config.resolve_paths(&[]), Err(ConfigError::NoWatchPaths)));
    ///
    /// let roots = config.resolve_paths(&[Utf8PathBuf::from("/music")]).unwrap();
    /// assert_eq!(roots, vec![Utf8PathBuf::from("/music")]);
    /// ```
    pub fn resolve_paths(&self, args: &[Utf8PathBuf]) -> Result<Vec<Utf8PathBuf>, ConfigError> {
        let source = if args.is_empty() { &self.paths } else { args };
        if source.is_empty() {
            return Err(ConfigError::NoWatchPaths);
        }

        let mut roots = source
            .iter()
            .map(|path| absolute_path(path))
            .collect::<Result<Vec<_>, _>>()?;
        roots.sort();
        roots.dedup();
        Ok(roots)
    }
}

/// Configuration for the import step.
///
/// # Examples
///
/// ```
/// use bw_core::ImportConfig;
///
/// let config = ImportConfig::default();
/// assert_eq!(config.command, vec!["beet", "import", "-q"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Program and leading arguments of the import command.
    ///
    /// The directories of each batch are appended as trailing arguments.
    pub command: Vec<String>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            command: vec!["beet".to_owned(), "import".to_owned(), "-q".to_owned()],
        }
    }
}

/// Root configuration for batchwatch.
///
/// # Examples
///
/// ```
/// use bw_core::Config;
///
/// let config = Config::from_json_str(r#"{"watch": {"back_off": 5.0}}"#).unwrap();
/// assert!((config.watch.back_off - 5.0).abs() < f64::EPSILON);
/// assert!(config.watch.recursive);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Watch session configuration.
    pub watch: WatchConfig,

    /// Import command configuration.
    pub import: ImportConfig,
}

impl Config {
    /// Parses a configuration from a JSON string.
    ///
    /// Missing keys take their default values.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Loads a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Parse`] if it is not valid configuration JSON.
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Validates every section of the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.watch.validate()?;
        if self.import.command.first().is_none_or(String::is_empty) {
            return Err(ConfigError::invalid_option(
                "import.command",
                "must name a program to run",
            ));
        }
        Ok(())
    }
}

fn positive_seconds(option: &str, secs: f64) -> Result<Duration, ConfigError> {
    let duration = Duration::try_from_secs_f64(secs)
        .map_err(|e| ConfigError::invalid_option(option, e.to_string()))?;
    if duration.is_zero() {
        return Err(ConfigError::invalid_option(option, "must be greater than zero"));
    }
    Ok(duration)
}

fn absolute_path(path: &Utf8Path) -> Result<Utf8PathBuf, ConfigError> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let absolute = std::path::absolute(path.as_std_path()).map_err(|e| ConfigError::InvalidPath {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Utf8PathBuf::try_from(absolute).map_err(|e| ConfigError::InvalidPath {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}
