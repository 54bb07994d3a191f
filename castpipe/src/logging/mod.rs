//! Tracing subscriber setup.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "castpipe=info,sqlx=warn,tower_http=info";

/// Initialize logging with an env-filter and fmt layer, plus an optional
/// non-blocking daily-rolling file appender. The returned guard must be
/// held for the process lifetime or file logs are lost on shutdown.
pub fn init(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer());

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "castpipe.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(non_blocking),
                )
                .init();
            Some(guard)
        }
        None => {
            registry.init();
            None
        }
    }
}
