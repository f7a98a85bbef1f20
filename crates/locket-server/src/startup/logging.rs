//! Logging setup for the Locket server
//!
//! One human-readable console layer. `RUST_LOG` takes precedence over the
//! configured level.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// Build the filter for `level`, letting `RUST_LOG` win when it is set
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Install the global subscriber
pub fn init_logging(level: &str) -> anyhow::Result<()> {
    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(env_filter(level));

    tracing_subscriber::registry().with(console_layer).try_init()?;

    Ok(())
}
