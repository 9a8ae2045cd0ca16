//! CLI entry point for batchwatch.
//!
//! This binary watches one or more directories and, once a changed
//! directory has been quiet for the back-off window, hands the collected
//! directories to an import command (`beet import -q` by default).
//!
//! # Usage
//!
//! ```bash
//! batchwatch [OPTIONS] [PATHS]... [-- <IMPORT COMMAND>...]
//!
//! # Watch a download folder with the default importer
//! batchwatch ~/Downloads/music
//!
//! # Shorter back-off, only react to audio files
//! batchwatch --back-off 10 --pattern '*.flac' --pattern '*.mp3' ~/incoming
//!
//! # Custom import command
//! batchwatch ~/incoming -- beet import -q --move
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

use bw_core::Config;
use bw_watcher::{
    CommandSink, DebounceLoop, EventNormalizer, LoopSummary, PatternFilter, SubscriptionOptions,
    WatchSubscription, aggregation_queue,
};
use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use color_eyre::eyre::{WrapErr as _, eyre};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// CLI ARGUMENT TYPES
// =============================================================================

/// Watch directories and import new albums once they stop changing.
///
/// Every change is reduced to the directory containing it. When no change
/// has arrived for the back-off window, all collected directories are passed
/// to the import command in one invocation.
#[derive(Parser, Debug)]
#[command(name = "batchwatch", version, about, long_about = None)]
struct Cli {
    /// Directories to watch (overrides `watch.paths` from the config file).
    #[arg(value_name = "PATHS")]
    paths: Vec<Utf8PathBuf>,

    /// Path to a JSON configuration file.
    #[arg(short, long, env = "BATCHWATCH_CONFIG")]
    config: Option<Utf8PathBuf>,

    /// Watch subdirectories too.
    #[arg(long, value_name = "BOOL")]
    recursive: Option<bool>,

    /// Watch backend polling interval in seconds.
    #[arg(long, value_name = "SECS")]
    timeout: Option<f64>,

    /// Seconds without changes before a batch is imported.
    #[arg(long, value_name = "SECS")]
    back_off: Option<f64>,

    /// Only react to paths matching this glob (repeatable).
    #[arg(long = "pattern", value_name = "GLOB")]
    patterns: Vec<String>,

    /// Never react to paths matching this glob (repeatable).
    #[arg(long = "ignore-pattern", value_name = "GLOB")]
    ignore_patterns: Vec<String>,

    /// Ignore events whose subject is a directory.
    #[arg(long)]
    ignore_directories: bool,

    /// Match globs case-insensitively.
    #[arg(long)]
    case_insensitive: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long)]
    verbose: bool,

    /// Disable colored output.
    #[arg(long)]
    no_color: bool,

    /// Import command; the batch directories are appended as arguments.
    #[arg(last = true, value_name = "IMPORT COMMAND")]
    import_command: Vec<String>,
}

// =============================================================================
// INITIALIZATION FUNCTIONS
// =============================================================================

/// Initializes the tracing subscriber for logging.
///
/// Respects the `RUST_LOG` environment variable if set. Otherwise, uses
/// `debug` level if `--verbose` is set, or `info` level by default.
/// The `notify` backend is filtered to `warn` level.
fn init_tracing(verbose: bool, no_color: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose { "debug" } else { "info" };
        EnvFilter::new(format!("{level},notify=warn"))
    });

    // Check if colors should be disabled (flag or NO_COLOR env var)
    let use_ansi = !no_color && std::env::var("NO_COLOR").is_err();

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_ansi(use_ansi))
        .with(filter)
        .init();
}

/// Loads the config file, or the defaults if none was given.
fn load_config(path: Option<&Utf8Path>) -> color_eyre::Result<Config> {
    match path {
        Some(path) => {
            Config::load(path).wrap_err_with(|| format!("Failed to load config from {path}"))
        }
        None => Ok(Config::default()),
    }
}

/// Applies command-line overrides on top of the loaded configuration.
fn apply_overrides(config: &mut Config, cli: &Cli) {
    let watch = &mut config.watch;
    if let Some(recursive) = cli.recursive {
        watch.recursive = recursive;
    }
    if let Some(timeout) = cli.timeout {
        watch.timeout = timeout;
    }
    if let Some(back_off) = cli.back_off {
        watch.back_off = back_off;
    }
    if !cli.patterns.is_empty() {
        watch.patterns = Some(cli.patterns.clone());
    }
    if !cli.ignore_patterns.is_empty() {
        watch.ignore_patterns = Some(cli.ignore_patterns.clone());
    }
    if cli.ignore_directories {
        watch.ignore_directories = true;
    }
    if cli.case_insensitive {
        watch.case_sensitive = false;
    }
    if !cli.import_command.is_empty() {
        config.import.command.clone_from(&cli.import_command);
    }
}

// =============================================================================
// WATCH LOOP
// =============================================================================

/// Watches `paths` and imports batches until a shutdown signal arrives.
///
/// # Errors
///
/// Returns an error if the filter, the watch subscription, or the import
/// command cannot be set up.
async fn run_watch(config: &Config, paths: &[Utf8PathBuf]) -> color_eyre::Result<()> {
    let back_off = config.watch.back_off_duration()?;
    let options = SubscriptionOptions {
        recursive: config.watch.recursive,
        poll_interval: config.watch.timeout_duration()?,
    };

    info!(
        paths = ?paths,
        back_off = ?back_off,
        recursive = options.recursive,
        patterns = ?config.watch.patterns,
        ignore_patterns = ?config.watch.ignore_patterns,
        ignore_directories = config.watch.ignore_directories,
        case_sensitive = config.watch.case_sensitive,
        command = ?config.import.command,
        "Starting batchwatch"
    );

    let filter = PatternFilter::from_config(&config.watch)?;
    let sink = CommandSink::new(config.import.command.iter().map(String::as_str))
        .ok_or_else(|| eyre!("import command is empty"))?;

    let (sender, receiver) = aggregation_queue();
    let normalizer = EventNormalizer::new(sender);
    let subscription = WatchSubscription::start(paths, options, filter, move |event| {
        normalizer.handle(&event);
    })
    .wrap_err("Failed to start watching")?;

    let debounce = DebounceLoop::new(
        subscription.roots().iter().cloned(),
        back_off,
        receiver,
        sink,
    );

    tokio::select! {
        summary = debounce.run() => {
            log_summary(summary);
        }
        signal = shutdown_signal() => {
            let signal = signal?;
            info!(signal, "Shutting down");
        }
    }

    drop(subscription);
    Ok(())
}

/// Waits for Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() -> color_eyre::Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                Ok("SIGINT")
            }
            _ = sigterm.recv() => Ok("SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok("Ctrl-C")
    }
}

fn log_summary(summary: LoopSummary) {
    info!(
        flushes = summary.flushes,
        failed_imports = summary.failed_imports,
        discarded = summary.discarded,
        "Watch ended"
    );
}

// =============================================================================
// MAIN ENTRY POINT
// =============================================================================

/// Application entry point.
#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // 1. Install color-eyre FIRST (before any potential panics)
    color_eyre::install()?;

    // 2. Parse CLI arguments
    let cli = Cli::parse();

    // 3. Initialize tracing (handles --no-color for log output)
    init_tracing(cli.verbose, cli.no_color);

    // 4. Build configuration: file, then CLI overrides
    let mut config = load_config(cli.config.as_deref())?;
    apply_overrides(&mut config, &cli);
    config.validate()?;

    // 5. Resolve watch roots before anything is watched
    let paths = config.watch.resolve_paths(&cli.paths)?;

    run_watch(&config, &paths).await
}
