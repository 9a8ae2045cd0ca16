//! Import sinks that consume finalized batches.
//!
//! The debounce loop hands each [`Batch`] to an [`ImportSink`] and awaits it
//! before waiting on the queue again. Sinks may fail; the loop logs the
//! failure and drops the batch.
//!
//! Two implementations are provided:
//!
//! - [`CommandSink`] runs an external command with the batch directories
//!   appended as arguments (`beet import -q <dir>...`).
//! - Any `FnMut(&Batch) -> Result<(), ImportError>` closure, for in-process
//!   sinks and tests.

use std::future::Future;
use std::process::ExitStatus;

use tokio::process::Command;

use crate::debounce::Batch;

/// Errors raised by an [`ImportSink`].
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    /// The import command could not be started.
    #[error("failed to start import command '{program}': {source}")]
    Spawn {
        /// The program that failed to start.
        program: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The import command ran but reported failure.
    #[error("import command '{program}' failed: {status}")]
    Failed {
        /// The program that failed.
        program: String,
        /// Its exit status.
        status: ExitStatus,
    },

    /// Any other import failure.
    #[error("{0}")]
    Other(String),
}

impl ImportError {
    /// Creates an [`ImportError::Other`] from a message.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

/// Consumes finalized batches of directories.
pub trait ImportSink: Send {
    /// Imports every directory in `batch`.
    ///
    /// There is no timeout on this call; the debounce loop waits for it to
    /// finish. Changes arriving meanwhile stay queued for the next batch.
    fn import(&mut self, batch: &Batch) -> impl Future<Output = Result<(), ImportError>> + Send;
}

impl<F> ImportSink for F
where
    F: FnMut(&Batch) -> Result<(), ImportError> + Send,
{
    fn import(&mut self, batch: &Batch) -> impl Future<Output = Result<(), ImportError>> + Send {
        std::future::ready(self(batch))
    }
}

/// Runs an external command once per batch.
///
/// The command's standard streams are inherited, so an interactive importer
/// can still talk to the terminal.
///
/// # Examples
///
/// ```
/// use bw_watcher::CommandSink;
///
/// let sink = CommandSink::new(["beet", "import", "-q"]).unwrap();
/// assert_eq!(sink.program(), "beet");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSink {
    program: String,
    args: Vec<String>,
}

impl CommandSink {
    /// Creates a sink from a program and its leading arguments.
    ///
    /// Returns `None` if `command` is empty.
    #[must_use]
    pub fn new<I, S>(command: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut parts = command.into_iter().map(Into::into);
        let program = parts.next().filter(|p: &String| !p.is_empty())?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }

    /// Returns the program name.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Returns the leading arguments.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl ImportSink for CommandSink {
    async fn import(&mut self, batch: &Batch) -> Result<(), ImportError> {
        let status = Command::new(&self.program)
            .args(&self.args)
            .args(batch.iter().map(|dir| dir.as_path().as_str()))
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|source| ImportError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(ImportError::Failed {
                program: self.program.clone(),
                status,
            })
        }
    }
}
