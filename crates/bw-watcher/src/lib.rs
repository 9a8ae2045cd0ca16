//! Directory watching with back-off batching for music imports.
//!
//! This crate turns a stream of raw filesystem changes under one or more
//! watch roots into occasional batches of "directories that changed and have
//! since gone quiet", which are handed to an importer.
//!
//! # Overview
//!
//! The bw-watcher crate is designed to:
//!
//! - Watch several root directories at once through `notify`
//! - Reduce every change to the directory that contains it
//! - Wait until nothing has changed for a back-off window (30s by default)
//! - Import the collected directories as one batch
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    notify backend thread(s)                     │
//! │  ┌───────────────────┐    ┌────────────────┐    ┌────────────┐  │
//! │  │ WatchSubscription │ -> │ FileFilter     │ -> │ Event      │  │
//! │  │ (N roots)         │    │ (patterns)     │    │ Normalizer │  │
//! │  └───────────────────┘    └────────────────┘    └─────┬──────┘  │
//! └───────────────────────────────────────────────────────│─────────┘
//!                                                         │
//!                                          put (unbounded)│
//!                                                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Async Runtime (tokio)                        │
//! │  ┌──────────────────┐    ┌────────────────┐    ┌────────────┐   │
//! │  │ QueueReceiver    │ -> │ DebounceLoop   │ -> │ ImportSink │   │
//! │  │ (get w/ timeout) │    │ (PendingSet)   │    │ (Batch)    │   │
//! │  └──────────────────┘    └────────────────┘    └────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Crate Dependencies
//!
//! ```text
//! bw-cli ──► bw-watcher ──► bw-core
//!        └──────────────────►
//! ```
//!
//! # Usage
//!
//! ## Watching and Importing
//!
//! ```no_run
//! use bw_watcher::{
//!     aggregation_queue, AcceptAllFilter, CommandSink, DebounceLoop, EventNormalizer,
//!     SubscriptionOptions, WatchSubscription,
//! };
//! use camino::Utf8PathBuf;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (sender, receiver) = aggregation_queue();
//!     let normalizer = EventNormalizer::new(sender);
//!
//!     let subscription = WatchSubscription::start(
//!         &[Utf8PathBuf::from("/music/incoming")],
//!         SubscriptionOptions::default(),
//!         AcceptAllFilter,
//!         move |event| normalizer.handle(&event),
//!     )?;
//!
//!     let sink = CommandSink::new(["beet", "import", "-q"]).ok_or("empty command")?;
//!     let debounce = DebounceLoop::new(
//!         subscription.roots().iter().cloned(),
//!         Duration::from_secs(30),
//!         receiver,
//!         sink,
//!     );
//!
//!     // Runs until the subscription (and with it the normalizer) is dropped.
//!     let summary = debounce.run().await;
//!     println!("{} batches imported", summary.flushes);
//!     Ok(())
//! }
//! ```
//!
//! ## Custom Filtering
//!
//! ```
//! use bw_watcher::{CompositeFilter, FileFilter, PatternFilter};
//! use camino::Utf8Path;
//!
//! // Skip partially downloaded files
//! struct NoPartials;
//!
//! impl FileFilter for NoPartials {
//!     fn should_process(&self, path: &Utf8Path, _is_directory: bool) -> bool {
//!         path.extension() != Some("part")
//!     }
//! }
//!
//! let patterns = PatternFilter::builder()
//!     .ignore_patterns(["*/.DS_Store"])
//!     .build()
//!     .unwrap();
//!
//! let filter = CompositeFilter::new().and(patterns).and(NoPartials);
//! assert!(filter.should_process(Utf8Path::new("/music/a/01.flac"), false));
//! assert!(!filter.should_process(Utf8Path::new("/music/a/01.flac.part"), false));
//! ```
//!
//! # Error Handling
//!
//! Setup failures use [`WatchError`]; import failures use [`ImportError`]
//! and never stop the loop:
//!
//! ```
//! use bw_watcher::WatchError;
//!
//! fn handle_watch_error(err: WatchError) {
//!     if err.is_fatal() {
//!         eprintln!("Fatal watcher error: {}", err);
//!     } else {
//!         eprintln!("Warning: {}", err);
//!     }
//! }
//! ```
//!
//! # Performance Considerations
//!
//! - **Non-blocking producers**: The aggregation queue is unbounded, so the
//!   backend's callback thread never waits on the debounce loop.
//!
//! - **Little I/O on the callback path**: Directory-ness comes from the event
//!   kind, or one `lstat` when the backend doesn't say; existence checks
//!   happen once per item in the debounce loop.
//!
//! - **Small batches inline**: [`Batch`] stores up to 8 directories without
//!   a heap allocation.
//!
//! - **UTF-8 Paths**: Paths are validated as UTF-8 at the watch boundary;
//!   non-UTF-8 paths are logged and skipped.

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod debounce;
pub mod error;
pub mod events;
pub mod filter;
pub mod queue;
pub mod sink;
pub mod subscription;

// Re-export error types
pub use error::WatchError;

// Re-export event types
pub use events::{CanonicalDirectory, ChangeEvent, ChangeKind, EventNormalizer, normalize};

// Re-export filter types
pub use filter::{AcceptAllFilter, CompositeFilter, FileFilter, PatternFilter, PatternFilterBuilder};

// Re-export queue types
pub use queue::{QueueReceiver, QueueSender, Received, aggregation_queue};

// Re-export subscription types
pub use subscription::{SubscriptionOptions, WatchSubscription};

// Re-export debounce types
pub use debounce::{Batch, DebounceLoop, LoopSummary, PendingSet, Step};

// Re-export sink types
pub use sink::{CommandSink, ImportError, ImportSink};
