use std::fs::OpenOptions;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber, writing to `log_file` in append mode.
///
/// Falls back to stdout when the file cannot be opened. The returned guard
/// flushes buffered records when dropped and must outlive the program's work.
pub fn init(log_file: &Path, verbose: bool) -> WorkerGuard {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let file = OpenOptions::new().create(true).append(true).open(log_file);
    let (writer, guard, ansi) = match file {
        Ok(file) => {
            let (writer, guard) = tracing_appender::non_blocking(file);
            (writer, guard, false)
        }
        Err(e) => {
            eprintln!(
                "Could not open log file {}, logging to console instead: {e}",
                log_file.display()
            );
            let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());
            (writer, guard, true)
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(ansi)
                .with_target(false),
        )
        .init();

    guard
}
