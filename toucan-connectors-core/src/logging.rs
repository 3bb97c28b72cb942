//! Logging setup for the CLI and embedding applications.
//!
//! Driver crates log every statement at `info`; they are held at `warn`
//! unless tracing is requested (`-vv`) or `RUST_LOG` says otherwise.

use crate::Result;
use crate::error::ConnectorsError;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Targets of the backend drivers.
const DRIVER_TARGETS: &[&str] = &["sqlx", "tiberius", "mongodb"];

/// Output shape of log events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// Maps CLI verbosity flags to a log level.
///
/// `quiet` wins over any verbosity count.
pub fn level_for(verbose: u8, quiet: bool) -> Level {
    match (quiet, verbose) {
        (true, _) => Level::ERROR,
        (false, 0) => Level::INFO,
        (false, 1) => Level::DEBUG,
        (false, _) => Level::TRACE,
    }
}

/// Filter directives for `level`, with driver targets capped at `warn`
/// below `TRACE`.
pub fn default_directives(level: Level) -> String {
    let mut directives = level.as_str().to_ascii_lowercase();
    if level < Level::TRACE && level > Level::WARN {
        for target in DRIVER_TARGETS {
            directives.push_str(&format!(",{target}=warn"));
        }
    }
    directives
}

/// Initializes text logging on stderr.
///
/// # Arguments
/// * `verbose` - Verbosity level (0=INFO, 1=DEBUG, 2+=TRACE)
/// * `quiet` - If true, only show ERROR level logs
///
/// # Errors
/// Returns a configuration error if a global subscriber is already set.
///
/// # Example
/// ```rust,no_run
/// use toucan_connectors_core::logging::init_logging;
///
/// init_logging(1, false).expect("Failed to initialize logging");
/// ```
pub fn init_logging(verbose: u8, quiet: bool) -> Result<()> {
    init_logging_with_format(verbose, quiet, LogFormat::Text)
}

/// Initializes logging on stderr in the given format.
///
/// `RUST_LOG`, when set, replaces the directives derived from the flags.
///
/// # Errors
/// Returns a configuration error if a global subscriber is already set.
pub fn init_logging_with_format(verbose: u8, quiet: bool, format: LogFormat) -> Result<()> {
    let level = level_for(verbose, quiet);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    let installed = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().with_current_span(false).try_init(),
    };
    installed
        .map_err(|e| ConnectorsError::configuration(format!("Failed to initialize logging: {e}")))
}
