//! Tracing subscriber setup.
//!
//! Verbosity comes from `KINLINK_LOG` (EnvFilter syntax), `kinlink=info` when unset.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_ENV: &str = "KINLINK_LOG";
const DEFAULT_DIRECTIVE: &str = "kinlink=info";

fn filter() -> Result<EnvFilter> {
    match std::env::var(LOG_ENV) {
        Ok(directives) if !directives.trim().is_empty() => {
            EnvFilter::try_new(&directives)
                .with_context(|| format!("invalid {}: {}", LOG_ENV, directives))
        }
        _ => Ok(EnvFilter::new(DEFAULT_DIRECTIVE)),
    }
}

/// Log to stderr; used by one-shot commands
pub fn init_stderr() -> Result<()> {
    tracing_subscriber::registry()
        .with(filter()?)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init()
        .context("failed to install tracing subscriber")?;
    Ok(())
}

/// Log to `file` through a background writer; the terminal belongs to the UI.
///
/// Keep the returned guard alive until exit or buffered lines are lost.
pub fn init_file(file: &Path) -> Result<WorkerGuard> {
    let dir = file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create log dir: {}", dir.display()))?;
    let name = file
        .file_name()
        .with_context(|| format!("log path has no file name: {}", file.display()))?;

    let appender = tracing_appender::rolling::never(dir, name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(filter()?)
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .try_init()
        .context("failed to install tracing subscriber")?;
    Ok(guard)
}
