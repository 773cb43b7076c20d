//! Tracing setup. stdout belongs to the protocol, so log output goes to a
//! file when one is configured and to stderr otherwise.

use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub const TRACE_ENV: &str = "GCLANGD_TRACE";
/// Honored for drop-in compatibility with clangd launch configurations.
pub const CLANGD_TRACE_ENV: &str = "CLANGD_TRACE";

pub struct LoggingGuard {
    _guard: WorkerGuard,
}

fn trace_enabled() -> bool {
    [TRACE_ENV, CLANGD_TRACE_ENV].iter().any(|var| {
        std::env::var(var)
            .map(|v| !v.is_empty() && v != "0")
            .unwrap_or(false)
    })
}

/// `CLANGD_TRACE=<path>` doubles as a default log destination, the way
/// clangd itself treats it.
pub fn default_log_file() -> Option<PathBuf> {
    let value = std::env::var(CLANGD_TRACE_ENV).ok()?;
    if value.is_empty() || value == "0" || value == "1" {
        return None;
    }
    Some(PathBuf::from(value))
}

pub fn init(log_file: Option<&Path>) -> Option<LoggingGuard> {
    let (non_blocking, guard) = match log_file {
        Some(path) => {
            let file = match std::fs::OpenOptions::new().create(true).append(true).open(path) {
                Ok(file) => file,
                Err(err) => {
                    eprintln!("gclangd: cannot open log file {}: {err}", path.display());
                    return init(None);
                }
            };
            tracing_appender::non_blocking(file)
        }
        None => tracing_appender::non_blocking(std::io::stderr()),
    };

    let default_filter = if trace_enabled() {
        "gclangd=trace"
    } else {
        "gclangd=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let subscriber = tracing_subscriber::registry().with(env_filter).with(
        tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true),
    );

    if subscriber.try_init().is_err() {
        return None;
    }

    std::panic::set_hook(Box::new(|panic_info| {
        tracing::error!(panic = %panic_info, "panic");
    }));

    Some(LoggingGuard { _guard: guard })
}
