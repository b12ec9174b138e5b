//! Configuration loading and validation for the stack synthesizer.
//!
//! Non-sensitive settings are read from environment variables through the
//! `config` crate. The ingestion credential is checked separately by
//! [`validate_env`] before any construct is declared, and never lands in
//! [`Config`].

use std::collections::BTreeMap;
use std::fmt;

use anyhow::{Context, Result};
use common::StackError;
use serde::Deserialize;
use thiserror::Error;

use crate::instrumentation::InstrumentationVariant;
use crate::resources::GrantStrategy;

/// Environment variable carrying the backend ingestion key.
pub const HONEYCOMB_API_KEY: &str = "HONEYCOMB_API_KEY";

/// External inputs that must be present before the stack body runs.
pub const REQUIRED_INPUTS: &[&str] = &[HONEYCOMB_API_KEY];

/// A string setting that does not name one of the supported options.
#[derive(Debug, Error)]
#[error("unknown option {0:?}")]
pub struct UnknownOption(pub String);

// ---------------------------------------------------------------------------
// Required-input validation
// ---------------------------------------------------------------------------

/// An opaque sensitive value. Never printed, not even in debug builds.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Borrow the plaintext. Only the deploy hand-off should need this.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential([REDACTED])")
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Values returned by [`validate_env`], keyed by variable name.
#[derive(Clone, Default)]
pub struct ValidatedEnv {
    values: BTreeMap<String, Credential>,
}

impl ValidatedEnv {
    /// Look up a validated value.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::MissingInput`] if `name` was not part of the
    /// validated set.
    pub fn credential(&self, name: &str) -> Result<&Credential, StackError> {
        self.values
            .get(name)
            .ok_or_else(|| StackError::MissingInput(vec![name.to_owned()]))
    }

    /// Names that passed validation.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

impl fmt::Debug for ValidatedEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}

/// Check that every name in `names` resolves to a non-blank value.
///
/// Pure: `lookup` is the only source consulted and nothing is cached. All
/// missing names are reported together.
///
/// # Errors
///
/// Returns [`StackError::MissingInput`] listing every absent or blank name.
pub fn validate_env<F>(names: &[&str], lookup: F) -> Result<ValidatedEnv, StackError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut values = BTreeMap::new();
    let mut missing = Vec::new();

    for name in names {
        match lookup(name) {
            Some(v) if !v.trim().is_empty() => {
                values.insert((*name).to_owned(), Credential(v));
            }
            _ => missing.push((*name).to_owned()),
        }
    }

    if missing.is_empty() {
        Ok(ValidatedEnv { values })
    } else {
        Err(StackError::MissingInput(missing))
    }
}

// ---------------------------------------------------------------------------
// Synthesizer settings
// ---------------------------------------------------------------------------

/// Validated synthesizer configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Target region as exported by the deploy tooling.
    #[serde(default)]
    pub cdk_default_region: Option<String>,

    /// Fallback region from the standard AWS variable.
    #[serde(default)]
    pub aws_region: Option<String>,

    /// Target account, if known at synth time.
    #[serde(default)]
    pub cdk_default_account: Option<String>,

    /// Name of the synthesized stack.
    #[serde(default = "default_stack_name")]
    pub stack_name: String,

    /// Directory the cloud assembly is written to.
    #[serde(default = "default_out_dir")]
    pub out_dir: String,

    /// Instrumentation scheme: `otel-sdk` or `adot-distro`.
    #[serde(default = "default_instrumentation")]
    pub instrumentation: String,

    /// How the collector's read grant is attached: `inline-policy` or `resource-policy`.
    #[serde(default = "default_grant_strategy")]
    pub grant_strategy: String,

    /// Overrides the instrumentation layer ARN for the chosen variant.
    #[serde(default)]
    pub layer_arn: Option<String>,

    /// Overrides the bundled collector configuration file.
    #[serde(default)]
    pub confmap_path: Option<String>,

    /// Tracing log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_stack_name() -> String {
    "cdk-aws-apprunner-otel-collector-dev".into()
}
fn default_out_dir() -> String {
    "cdk.out".into()
}
fn default_instrumentation() -> String {
    "otel-sdk".into()
}
fn default_grant_strategy() -> String {
    "inline-policy".into()
}
fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be parsed or fails validation.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build synthesizer configuration from environment")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise synthesizer configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// Target region, preferring `CDK_DEFAULT_REGION` over `AWS_REGION`.
    pub fn region(&self) -> Option<&str> {
        self.cdk_default_region
            .as_deref()
            .or(self.aws_region.as_deref())
            .map(str::trim)
            .filter(|r| !r.is_empty())
    }

    /// Parsed instrumentation variant.
    pub fn variant(&self) -> Result<InstrumentationVariant> {
        self.instrumentation
            .parse()
            .with_context(|| {
                format!("INSTRUMENTATION has unsupported value {:?}", self.instrumentation)
            })
    }

    /// Parsed grant strategy.
    pub fn strategy(&self) -> Result<GrantStrategy> {
        self.grant_strategy
            .parse()
            .with_context(|| {
                format!("GRANT_STRATEGY has unsupported value {:?}", self.grant_strategy)
            })
    }

    fn validate(&self) -> Result<()> {
        if self.region().is_none() {
            anyhow::bail!("CDK_DEFAULT_REGION or AWS_REGION is required and must not be empty");
        }
        ensure_non_empty(&self.stack_name, "STACK_NAME")?;
        ensure_non_empty(&self.out_dir, "OUT_DIR")?;
        if !self
            .stack_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            anyhow::bail!("STACK_NAME may only contain ASCII letters, digits and hyphens");
        }
        self.variant()?;
        self.strategy()?;
        Ok(())
    }
}

fn ensure_non_empty(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("{name} is required and must not be empty");
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        cdk_default_region: Some("eu-central-1".into()),
        aws_region: None,
        cdk_default_account: Some("123456789012".into()),
        stack_name: default_stack_name(),
        out_dir: default_out_dir(),
        instrumentation: default_instrumentation(),
        grant_strategy: default_grant_strategy(),
        layer_arn: None,
        confmap_path: None,
        log_level: default_log_level(),
    }
}
