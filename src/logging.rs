use std::fs;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_DIRECTIVE: &str = "attendee_profiler=info";

/// Initializes console logging, plus a daily-rotated JSON log file under `log_dir`.
///
/// Keep the returned guard alive until exit so buffered file logs are flushed.
pub fn init_logging(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));
    let console_layer = fmt::layer().with_writer(std::io::stderr);

    let (file_layer, guard) = match log_dir {
        Some(dir) => match fs::create_dir_all(dir) {
            Ok(()) => {
                let file_appender = tracing_appender::rolling::daily(dir, "profiler.log");
                let (writer, guard) = tracing_appender::non_blocking(file_appender);
                (Some(fmt::layer().json().with_writer(writer)), Some(guard))
            }
            Err(e) => {
                eprintln!("Failed to create log directory '{}': {}", dir.display(), e);
                (None, None)
            }
        },
        None => (None, None),
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init();

    guard
}
