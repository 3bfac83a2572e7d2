//! Tracing subscriber setup.

use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::LoggingSection;

const DEFAULT_FILTER: &str = "forge_scaffold=info,tower_http=warn";

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the defaults; `verbose` lowers the crate's level to
/// debug. The returned guard must be held for the file writer to flush.
pub fn init(logging: &LoggingSection, verbose: bool) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("forge_scaffold=debug,tower_http=info")
        } else {
            EnvFilter::new(DEFAULT_FILTER)
        }
    });

    let (file_layer, guard) = match &logging.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, "forge-scaffold.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false).json();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let stderr_layer = if logging.json {
        fmt::layer().with_writer(std::io::stderr).json().boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .compact()
            .boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()?;

    Ok(guard)
}
