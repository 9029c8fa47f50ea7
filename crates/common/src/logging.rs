//! Logging and tracing initialization.

use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

/// Initialize the tracing subscriber with the given configuration.
///
/// `RUST_LOG` takes precedence over `config.level`. When `config.file` is
/// set, log lines are appended to that file instead of stderr. Returns
/// `false` if a global subscriber was already installed.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let builder = fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_names(true)
        .with_file(false)
        .with_line_number(false);

    let file = config.file.as_ref().and_then(|path| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| eprintln!("Failed to open log file {}: {e}", path.display()))
            .ok()
    });

    let installed = match (config.json, file) {
        (true, Some(file)) => tracing::subscriber::set_global_default(
            builder.json().with_writer(Mutex::new(file)).finish(),
        ),
        (true, None) => tracing::subscriber::set_global_default(builder.json().finish()),
        (false, Some(file)) => tracing::subscriber::set_global_default(
            builder.with_ansi(false).with_writer(Mutex::new(file)).finish(),
        ),
        (false, None) => tracing::subscriber::set_global_default(builder.finish()),
    };
    installed.is_ok()
}

/// Initialize logging with defaults (useful for tests and quick scripts).
pub fn init_default_logging() -> bool {
    init_logging(&LoggingConfig::default())
}
