//! Tracing setup for the two CLI entry points.
//!
//! A `run` invocation talks to a live language service and may end in a
//! sent message, so every pass leaves a JSON record on disk
//! ([`init_production`]); the offline subcommands only need stderr
//! ([`init_cli`]). Built on `tracing-subscriber` layers with a
//! `tracing-appender` file sink.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Keeps the non-blocking file writer alive until the process exits.
///
/// Pipeline runs are short; events still buffered when the run finishes
/// are flushed when this guard drops, so `main` must hold it to the end.
pub struct LoggingGuard {
    _guard: WorkerGuard,
}

/// Initialise logging for pipeline runs.
///
/// Each event goes to `{logs_dir}/brokerbot.log.YYYY-MM-DD` as a JSON
/// line (rotated daily, appended across invocations) and to stderr in
/// human-readable form. The filter comes from `RUST_LOG` when set,
/// otherwise from the configured `default_level`.
///
/// # Errors
///
/// Returns an error if the logs directory cannot be created.
pub fn init_production(logs_dir: &Path, default_level: &str) -> anyhow::Result<LoggingGuard> {
    std::fs::create_dir_all(logs_dir).map_err(|e| {
        anyhow::anyhow!(
            "failed to create logs directory {}: {e}",
            logs_dir.display()
        )
    })?;

    let file_appender = tracing_appender::rolling::daily(logs_dir, "brokerbot.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking);

    let console_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(console_layer)
        .init();

    Ok(LoggingGuard { _guard: guard })
}

/// Initialise stderr-only logging for subcommands that never call out.
///
/// `check` reads a case file and exits; nothing worth keeping on disk
/// happens, so there is no file sink. Controlled by `RUST_LOG`
/// (default: `info`).
pub fn init_cli() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}
