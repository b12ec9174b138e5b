//! `synth`: renders the collector stack into a cloud assembly.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`](stack::Config) from environment variables.
//! 2. Initialise structured JSON logging.
//! 3. Validate required inputs, declare the stack and write the assembly.

use anyhow::Result;
use tracing::info;

fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = stack::Config::from_env().map_err(|e| {
        eprintln!("ERROR: synth configuration invalid: {e:#}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    stack::telemetry::init(&cfg.log_level)?;
    info!(
        stack = %cfg.stack_name,
        instrumentation = %cfg.instrumentation,
        grant_strategy = %cfg.grant_strategy,
        "synth starting"
    );

    // -----------------------------------------------------------------------
    // 3. Synthesis
    // -----------------------------------------------------------------------
    let assembly = stack::run(&cfg, |name| std::env::var(name).ok())?;
    info!(
        template = %assembly.template_path.display(),
        manifest = %assembly.manifest_path.display(),
        "done"
    );
    Ok(())
}
