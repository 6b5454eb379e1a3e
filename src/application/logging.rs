use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use super::config::Configuration;

static LOGGER_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

/// Installs a `tracing` subscriber that writes to a daily-rolling file under
/// `config.log_dir()` and to stdout, filtered by `RUST_LOG`. Returns `false`
/// if a subscriber was already installed (e.g. by a test harness).
pub fn tracing_subscribe(config: &Configuration) -> bool {
    let env_filter_layer = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer();

    let file_appender = tracing_appender::rolling::daily(config.log_dir(), "ragctl.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    LOGGER_GUARD.set(guard).ok();
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter_layer)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .is_ok()
}
