//! Logging setup for the synthesizer.
//!
//! A single-pass CLI: structured JSON logs to stderr, no OTLP export. The
//! template goes to disk, so stdout stays free for piping.
//!
//! # Telemetry invariants
//!
//! - The ingestion credential must never appear in any log field.
//! - `RUST_LOG` overrides the configured `LOG_LEVEL`.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Initialise the tracing subscriber at the configured log level.
///
/// # Errors
///
/// Returns an error if the subscriber has already been set.
pub fn init(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .json()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialise synth tracing subscriber: {e}"))
}
