//! Error types for the bw-core crate.
//!
//! This module provides the [`ConfigError`] type for configuration-related errors
//! that can occur across the workspace.

use camino::Utf8PathBuf;

/// Errors that can occur during configuration loading and validation.
///
/// Every variant is fatal: configuration errors are reported to the user
/// before any directory is watched.
///
/// # Examples
///
/// ```
/// use bw_core::ConfigError;
///
/// let error = ConfigError::NoWatchPaths;
/// assert_eq!(error.to_string(), "no path specified");
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No watch paths were given on the command line or in the configuration.
    #[error("no path specified")]
    NoWatchPaths,

    /// The provided path is invalid or malformed.
    #[error("invalid path '{path}': {reason}")]
    InvalidPath {
        /// The invalid path.
        path: Utf8PathBuf,
        /// Explanation of why the path is invalid.
        reason: String,
    },

    /// A configuration option has an invalid value.
    #[error("invalid configuration option '{option}': {reason}")]
    InvalidOption {
        /// The name of the invalid option.
        option: String,
        /// Explanation of why the option is invalid.
        reason: String,
    },

    /// An I/O error occurred while reading configuration.
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConfigError {
    /// Creates a new [`ConfigError::InvalidOption`] error.
    #[inline]
    pub fn invalid_option(option: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidOption {
            option: option.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_watch_paths_display() {
        assert_eq!(ConfigError::NoWatchPaths.to_string(), "no path specified");
    }

    #[test]
    fn test_invalid_path_display() {
        let error = ConfigError::InvalidPath {
            path: Utf8PathBuf::from("/invalid/path"),
            reason: "path is not valid UTF-8".to_owned(),
        };
        let msg = error.to_string();
        assert!(msg.contains("/invalid/path"));
        assert!(msg.contains("not valid UTF-8"));
    }

    #[test]
    fn test_invalid_option_display() {
        let error = ConfigError::invalid_option("back_off", "must be positive");
        let msg = error.to_string();
        assert!(msg.contains("back_off"));
        assert!(msg.contains("must be positive"));
    }

    #[test]
    fn test_parse_error_from_serde() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{not json")
            .err()
            .map(ConfigError::from);
        assert!(matches!(parse_err, Some(ConfigError::Parse(_))));
    }
}
