//! Core configuration, errors, and collections for batchwatch.
//!
//! This crate provides the foundational types used across the workspace:
//!
//! - Configuration structures ([`Config`], [`WatchConfig`], [`ImportConfig`])
//! - The [`ConfigError`] type for configuration loading and validation
//! - Type aliases for `FxHashSet` (faster than std for path keys)

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod hash;

pub use config::{Config, ImportConfig, WatchConfig};
pub use error::ConfigError;
pub use hash::{FxHashSet, fx_hash_set};
