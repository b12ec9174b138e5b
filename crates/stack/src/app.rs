//! One synthesis pass, from validated inputs to the written assembly.
//!
//! Inputs are checked before anything is declared. A missing credential
//! stops the run with no construct created and nothing on disk.

use std::path::Path;

use anyhow::{Context, Result};
use common::template::Template;
use tracing::info;

use crate::assembly::{self, Assembly, StackTarget};
use crate::collector::ConfigArtifact;
use crate::config::{validate_env, Config, HONEYCOMB_API_KEY, REQUIRED_INPUTS};
use crate::stacks::observability::ids;
use crate::stacks::{ObservabilityStack, StackProps};

/// Deploy-time parameters and the variables that supply them.
pub const PARAMETER_SOURCES: &[(&str, &str)] = &[(ids::API_KEY_PARAMETER, HONEYCOMB_API_KEY)];

/// Declare and render the stack described by `cfg`.
///
/// `lookup` resolves environment variables; the binary passes
/// `std::env::var`.
///
/// # Errors
///
/// Fails with [`StackError::MissingInput`](common::StackError::MissingInput)
/// before any declaration if a required input is absent, and with the
/// underlying error if the artifact, stack, or template is invalid.
pub fn synth<F>(cfg: &Config, lookup: F) -> Result<(ObservabilityStack, Template)>
where
    F: Fn(&str) -> Option<String>,
{
    let inputs = validate_env(REQUIRED_INPUTS, lookup)?;
    let credential = inputs.credential(HONEYCOMB_API_KEY)?;

    let region = cfg
        .region()
        .context("CDK_DEFAULT_REGION or AWS_REGION is required")?;

    let artifact = match &cfg.confmap_path {
        Some(path) => ConfigArtifact::from_path(Path::new(path))?,
        None => ConfigArtifact::bundled()?,
    };
    artifact.ensure_excludes(credential)?;

    let mut props = StackProps::new(&cfg.stack_name, region, artifact);
    props.account = cfg.cdk_default_account.clone();
    props.variant = cfg.variant()?;
    props.grant_strategy = cfg.strategy()?;
    props.layer_arn = cfg.layer_arn.clone();

    let stack = ObservabilityStack::build(&props)?;
    let template = stack.synthesize()?;

    Ok((stack, template))
}

/// Synthesize and write the assembly into `cfg.out_dir`.
///
/// # Errors
///
/// See [`synth`]; also fails if the assembly cannot be written.
pub fn run<F>(cfg: &Config, lookup: F) -> Result<Assembly>
where
    F: Fn(&str) -> Option<String>,
{
    let (stack, template) = synth(cfg, lookup)?;

    let target = StackTarget {
        stack_name: stack.stack().name(),
        region: stack.stack().region(),
        account: stack.stack().account(),
        parameter_sources: PARAMETER_SOURCES,
    };
    let assembly = assembly::write(Path::new(&cfg.out_dir), &template, &target)
        .with_context(|| format!("failed to write cloud assembly to {}", cfg.out_dir))?;

    info!(
        resources = template.resources.len(),
        out_dir = %cfg.out_dir,
        "synthesis complete"
    );
    Ok(assembly)
}
