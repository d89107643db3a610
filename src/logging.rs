//! Tracing subscriber setup for host applications.
//!
//! Logs go to stderr and, when a directory is given, to a daily-rolling file
//! written off-thread. `RUST_LOG` overrides the default filter.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset. Keeps inference internals quiet.
pub const DEFAULT_FILTER: &str = "parley=info,parley_search=info,mistralrs=warn";

/// File name prefix of the rolling log files.
pub const LOG_FILE_PREFIX: &str = "parley.log";

/// Install the global subscriber.
///
/// Returns the file writer's guard when file logging is active; keep it alive
/// for as long as logs should be flushed. A second call leaves the existing
/// subscriber in place.
pub fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let (file_layer, guard) = match log_dir.and_then(file_appender) {
        Some(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let installed = Registry::default()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init();
    match installed {
        Ok(()) => {
            tracing::debug!("tracing initialized");
            guard
        }
        Err(_) => None,
    }
}

fn file_appender(dir: &Path) -> Option<RollingFileAppender> {
    if let Err(e) = std::fs::create_dir_all(dir) {
        eprintln!("cannot create log directory {}: {e}", dir.display());
        return None;
    }
    match RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .build(dir)
    {
        Ok(appender) => Some(appender),
        Err(e) => {
            eprintln!("cannot open log file in {}: {e}", dir.display());
            None
        }
    }
}
