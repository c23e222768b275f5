//! Logging initialization.
//!
//! Builds the tracing subscriber from [`LoggingConfig`]: console or file
//! output, optional daily rotation, text or JSON formatting. Call once at
//! startup; the returned `WorkerGuard` must stay alive for the life of the
//! process or buffered log lines are lost on exit.

use std::io;
use std::path::Path;

use tracing_appender::rolling;

use crate::config::LoggingConfig;

type LogWriter = Box<dyn io::Write + Send + Sync>;

fn rotating_writer(log_file: &str, max_backups: u32) -> LogWriter {
    let path = Path::new(log_file);
    let dir = path.parent().unwrap_or(Path::new("."));
    let prefix = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("linkgate.log")
        .trim_end_matches(".log");
    let appender = rolling::Builder::new()
        .rotation(rolling::Rotation::DAILY)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .max_log_files(max_backups as usize)
        .build(dir)
        .expect("Failed to create rolling log appender");
    Box::new(appender)
}

fn appending_writer(log_file: &str) -> LogWriter {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .expect("Failed to open log file");
    Box::new(file)
}

pub fn init_logging(config: &LoggingConfig) -> tracing_appender::non_blocking::WorkerGuard {
    let writer: LogWriter = match config.file.as_deref() {
        Some(log_file) if !log_file.is_empty() && config.enable_rotation => {
            rotating_writer(log_file, config.max_backups)
        }
        Some(log_file) if !log_file.is_empty() => appending_writer(log_file),
        _ => Box::new(io::stdout()),
    };

    let (non_blocking_writer, guard) = tracing_appender::non_blocking(writer);

    // RUST_LOG wins over the configured level when set
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.level.clone()));

    let to_console = config.file.as_ref().is_none_or(|f| f.is_empty());
    let builder = tracing_subscriber::fmt()
        .with_writer(non_blocking_writer)
        .with_env_filter(filter)
        .with_level(true)
        .with_ansi(to_console);

    if config.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }

    guard
}
