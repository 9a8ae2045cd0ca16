//! The aggregation queue between the normalizer and the debounce loop.
//!
//! An unbounded, FIFO, multi-producer single-consumer channel. Producers are
//! the watch backend's callback threads and must never block, so the channel
//! has no capacity limit. The consumer waits for the next directory with a
//! timeout that drives the back-off decision.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::error::WatchError;
use crate::events::CanonicalDirectory;

/// Creates a connected sender/receiver pair.
///
/// # Examples
///
/// ```
/// use bw_watcher::{aggregation_queue, CanonicalDirectory, Received};
/// use std::time::Duration;
///
/// # async fn example() {
/// let (sender, mut receiver) = aggregation_queue();
/// sender.put(CanonicalDirectory::new("/music/album")).unwrap();
///
/// match receiver.get(Duration::from_secs(30)).await {
///     Received::Item(dir) => println!("changed: {dir}"),
///     Received::TimedOut => println!("quiet"),
///     Received::Closed => println!("no producers left"),
/// }
/// # }
/// ```
#[must_use]
pub fn aggregation_queue() -> (QueueSender, QueueReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (QueueSender { tx }, QueueReceiver { rx })
}

/// Producer half of the aggregation queue.
///
/// Cheap to clone; each watch callback may hold its own copy.
#[derive(Debug, Clone)]
pub struct QueueSender {
    tx: mpsc::UnboundedSender<CanonicalDirectory>,
}

impl QueueSender {
    /// Appends a directory to the queue without blocking.
    ///
    /// Safe to call from synchronous threads outside the tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::ChannelClosed`] if the receiver has been dropped.
    #[inline]
    pub fn put(&self, directory: CanonicalDirectory) -> Result<(), WatchError> {
        self.tx.send(directory).map_err(|_| WatchError::ChannelClosed)
    }

    /// Returns `true` if the receiver has been dropped.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Outcome of waiting on the aggregation queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// The next directory in FIFO order.
    Item(CanonicalDirectory),
    /// Nothing arrived before the timeout elapsed.
    TimedOut,
    /// Every sender was dropped and the queue is drained.
    Closed,
}

/// Consumer half of the aggregation queue.
#[derive(Debug)]
pub struct QueueReceiver {
    rx: mpsc::UnboundedReceiver<CanonicalDirectory>,
}

impl QueueReceiver {
    /// Waits up to `timeout` for the next directory.
    ///
    /// Races the next queue item against a timer; whichever finishes first
    /// decides the result.
    pub async fn get(&mut self, timeout: Duration) -> Received {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(directory)) => Received::Item(directory),
            Ok(None) => Received::Closed,
            Err(_elapsed) => Received::TimedOut,
        }
    }

    /// Returns the next directory if one is already queued.
    pub fn try_get(&mut self) -> Option<CanonicalDirectory> {
        self.rx.try_recv().ok()
    }

    /// Returns the number of directories waiting in the queue.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Returns `true` if no directories are waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
