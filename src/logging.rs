//! tracing subscriber setup.
//!
//! Log lines always go to stderr. When a log directory is configured they are
//! also written, without ANSI colours, to a daily rolling file
//! (`kw.log.YYYY-MM-DD`) through a non-blocking writer. The returned
//! [`WorkerGuard`] flushes that writer when dropped, so `main` holds it for
//! the life of the process.

use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::Subscriber;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// File name prefix of the rolling log files.
pub const LOG_FILE_PREFIX: &str = "kw.log";

const NOISY_TARGETS: &[&str] = &["hyper", "reqwest", "sqlx", "h2", "tower_http"];

/// Map a `--log-level` value to a tracing level name.
pub fn parse_level(level: &str) -> Result<&'static str> {
    Ok(match level.to_ascii_lowercase().as_str() {
        "debug" => "debug",
        "info" => "info",
        "warning" | "warn" => "warn",
        "error" => "error",
        other => bail!(
            "invalid log level '{}' (expected debug, info, warning or error)",
            other
        ),
    })
}

/// Filter directives for `level`: HTTP and database libraries stay at
/// `warn` unless debug output was asked for.
pub fn directives(level: &str) -> String {
    let mut parts = vec![level.to_string()];
    if level != "debug" {
        parts.extend(NOISY_TARGETS.iter().map(|t| format!("{}=warn", t)));
    }
    parts.join(",")
}

/// Non-blocking writer onto a daily rolling file in `dir`, created if missing.
pub fn file_writer(dir: &Path) -> Result<(NonBlocking, WorkerGuard)> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .build(dir)
        .with_context(|| format!("Failed to open log file in {}", dir.display()))?;
    Ok(tracing_appender::non_blocking(appender))
}

fn subscriber(filter: EnvFilter, file: Option<NonBlocking>) -> impl Subscriber + Send + Sync {
    let file_layer = file.map(|writer| {
        fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_writer(writer)
    });
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(file_layer)
}

/// Install the global subscriber. `RUST_LOG` wins over `level` when set.
///
/// With `log_dir`, lines are also appended to the rolling file there; keep
/// the returned guard alive until exit or buffered lines are lost.
pub fn init(level: &str, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = parse_level(level)?;
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives(level)));

    let (writer, guard) = match log_dir {
        Some(dir) => {
            let (writer, guard) = file_writer(dir)?;
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    subscriber(filter, writer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialise logging: {}", e))?;
    Ok(guard)
}
