// file: src/logging/logger.rs
// version: 2.0.0
// guid: j0k1l2m3-n4o5-6789-0123-456789jklmno

//! Logger initialization and phase spans

use crate::Result;
use std::future::Future;
use tracing::Instrument;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Level used when neither `-v` nor `-q` is given and `RUST_LOG` is unset
const DEFAULT_LEVEL: &str = "info";

fn filter_for(verbose: bool, quiet: bool) -> EnvFilter {
    if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL))
    }
}

/// Initialize the logging system
///
/// Log lines go to stderr so command output on stdout stays parseable.
/// `-q` and `-v` win over `RUST_LOG`.
pub fn init_logger(verbose: bool, quiet: bool) -> Result<()> {
    tracing_subscriber::registry()
        .with(filter_for(verbose, quiet))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .try_init()
        .map_err(|e| {
            crate::error::ProvisionError::config(format!("Failed to initialize logger: {}", e))
        })?;

    Ok(())
}

/// Run a pipeline phase inside an `operation` span
pub async fn with_async_operation_span<Fut>(operation: &str, run_id: &str, fut: Fut) -> Fut::Output
where
    Fut: Future,
{
    let span = tracing::info_span!("operation", name = operation, run = run_id);
    fut.instrument(span).await
}
