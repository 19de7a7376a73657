use std::str::FromStr;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;

/// Rolling daily log under `logs/<file_name>`.
///
/// Keep the returned guard alive for the lifetime of the process, dropping it
/// flushes and stops the background writer.
pub fn init(file_name: &str, level: &str) -> WorkerGuard {
    let file_appender = rolling::daily("logs", file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let level = Level::from_str(level).unwrap_or(Level::DEBUG);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(level)
        .with_ansi(false)
        .with_target(false) // removes module path
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    guard
}
