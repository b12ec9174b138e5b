//! Instrumentation schemes for the traced function.
//!
//! The scheme is chosen once per stack. Each variant produces the complete
//! environment for its agent in one place, with the exporter endpoint
//! derived from the collector's late-bound URL.
//!
//! - [`OtelSdk`](InstrumentationVariant::OtelSdk): vendor-neutral SDK layer,
//!   `OTEL_EXPORTER_OTLP_ENDPOINT` set to the collector root.
//! - [`AdotDistro`](InstrumentationVariant::AdotDistro): ADOT distribution,
//!   `OTEL_EXPORTER_OTLP_TRACES_ENDPOINT` set to `<collector>/v1/traces`.

pub mod contract;

pub use contract::EnvironmentContract;

use std::str::FromStr;

use common::{StackError, Token};

use crate::config::UnknownOption;

/// Environment variable names understood by the agents.
pub mod env_vars {
    /// Agent activation hook run around the function's entry point.
    pub const EXEC_WRAPPER: &str = "AWS_LAMBDA_EXEC_WRAPPER";
    pub const SERVICE_NAME: &str = "OTEL_SERVICE_NAME";
    pub const PROPAGATORS: &str = "OTEL_PROPAGATORS";
    pub const EXPORTER_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
    pub const EXPORTER_TRACES_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_TRACES_ENDPOINT";
    pub const EXPORTER_PROTOCOL: &str = "OTEL_EXPORTER_OTLP_PROTOCOL";
    pub const EXPORTER_COMPRESSION: &str = "OTEL_EXPORTER_OTLP_COMPRESSION";
    /// ADOT-only: toggles the vendor's signal-correlation feature.
    pub const APPLICATION_SIGNALS_ENABLED: &str = "OTEL_AWS_APPLICATION_SIGNALS_ENABLED";
    pub const TRACES_EXPORTER: &str = "OTEL_TRACES_EXPORTER";
}

/// Fixed values written into the contract.
pub mod defaults {
    pub const PROPAGATORS: &str = "tracecontext";
    pub const PROTOCOL: &str = "http/protobuf";
    pub const COMPRESSION: &str = "gzip";
    pub const TRACES_PATH: &str = "/v1/traces";
}

/// Which agent instruments the function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrumentationVariant {
    /// Variant A: vendor-neutral SDK auto-instrumentation.
    OtelSdk,
    /// Variant B: ADOT distribution agent.
    AdotDistro,
}

impl InstrumentationVariant {
    /// Path of the execution wrapper shipped in the variant's layer.
    pub fn exec_wrapper(self) -> &'static str {
        match self {
            InstrumentationVariant::OtelSdk => "/opt/otel-handler",
            InstrumentationVariant::AdotDistro => "/opt/otel-instrument",
        }
    }

    /// Variable the exporter target is written to.
    pub fn endpoint_variable(self) -> &'static str {
        match self {
            InstrumentationVariant::OtelSdk => env_vars::EXPORTER_ENDPOINT,
            InstrumentationVariant::AdotDistro => env_vars::EXPORTER_TRACES_ENDPOINT,
        }
    }

    /// Variables that must all be present for tracing to run.
    pub fn required_variables(self) -> &'static [&'static str] {
        use env_vars::*;
        match self {
            InstrumentationVariant::OtelSdk => &[
                EXEC_WRAPPER,
                SERVICE_NAME,
                PROPAGATORS,
                EXPORTER_ENDPOINT,
                EXPORTER_PROTOCOL,
                EXPORTER_COMPRESSION,
            ],
            InstrumentationVariant::AdotDistro => &[
                EXEC_WRAPPER,
                SERVICE_NAME,
                PROPAGATORS,
                EXPORTER_TRACES_ENDPOINT,
                EXPORTER_PROTOCOL,
                APPLICATION_SIGNALS_ENABLED,
                TRACES_EXPORTER,
            ],
        }
    }

    /// Default layer for arm64 Node.js functions in `region`.
    pub fn default_layer_arn(self, region: &str) -> String {
        match self {
            InstrumentationVariant::OtelSdk => format!(
                "arn:aws:lambda:{region}:901920570463:layer:aws-otel-nodejs-arm64-ver-1-30-1:1"
            ),
            InstrumentationVariant::AdotDistro => {
                format!("arn:aws:lambda:{region}:615299751070:layer:AWSOpenTelemetryDistroJs:6")
            }
        }
    }

    /// Exporter target derived from the collector host name.
    pub fn exporter_endpoint(self, collector_host: &Token) -> Token {
        let suffix = match self {
            InstrumentationVariant::OtelSdk => "",
            InstrumentationVariant::AdotDistro => defaults::TRACES_PATH,
        };
        Token::join([
            Token::literal("https://"),
            collector_host.clone(),
            Token::literal(suffix),
        ])
    }

    /// The full environment for this variant.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::IncompleteContract`] if `service_name` is blank.
    pub fn environment(
        self,
        service_name: &str,
        collector_host: &Token,
    ) -> Result<EnvironmentContract, StackError> {
        use env_vars::*;

        let mut vars = vec![
            (EXEC_WRAPPER, Token::literal(self.exec_wrapper())),
            (SERVICE_NAME, Token::literal(service_name)),
            (PROPAGATORS, Token::literal(defaults::PROPAGATORS)),
            (self.endpoint_variable(), self.exporter_endpoint(collector_host)),
            (EXPORTER_PROTOCOL, Token::literal(defaults::PROTOCOL)),
        ];
        match self {
            InstrumentationVariant::OtelSdk => {
                vars.push((EXPORTER_COMPRESSION, Token::literal(defaults::COMPRESSION)));
            }
            InstrumentationVariant::AdotDistro => {
                vars.push((APPLICATION_SIGNALS_ENABLED, Token::literal("false")));
                vars.push((TRACES_EXPORTER, Token::literal("otlp")));
            }
        }

        EnvironmentContract::new(self, vars)
    }
}

impl FromStr for InstrumentationVariant {
    type Err = UnknownOption;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "otel-sdk" | "a" | "A" => Ok(InstrumentationVariant::OtelSdk),
            "adot-distro" | "b" | "B" => Ok(InstrumentationVariant::AdotDistro),
            other => Err(UnknownOption(other.to_owned())),
        }
    }
}
