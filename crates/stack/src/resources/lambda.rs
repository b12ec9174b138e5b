//! Lambda functions and externally published layers.

use std::collections::BTreeMap;

use common::template::ResourceDecl;
use common::{StackError, Token};
use serde_json::{json, Map, Value};

use super::iam::{lambda_basic_execution_policy, Role, LAMBDA_PRINCIPAL};
use super::Resource;
use crate::graph::Stack;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Runtime {
    Nodejs22x,
    Python313,
}

impl Runtime {
    pub fn as_str(self) -> &'static str {
        match self {
            Runtime::Nodejs22x => "nodejs22.x",
            Runtime::Python313 => "python3.13",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    Arm64,
    X86_64,
}

impl Architecture {
    pub fn as_str(self) -> &'static str {
        match self {
            Architecture::Arm64 => "arm64",
            Architecture::X86_64 => "x86_64",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggingFormat {
    Text,
    Json,
}

/// Function source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Code {
    /// Source embedded in the template; becomes `index.<ext>` in the package.
    Inline(String),
}

impl Code {
    fn to_json(&self) -> Value {
        match self {
            Code::Inline(src) => json!({ "ZipFile": src }),
        }
    }
}

/// A layer published outside this stack, referenced by ARN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerVersion {
    arn: Token,
}

impl LayerVersion {
    pub fn from_arn(arn: impl Into<Token>) -> Self {
        Self { arn: arn.into() }
    }
}

/// Everything needed to declare a [`Function`].
#[derive(Debug, Clone)]
pub struct FunctionProps {
    pub function_name: Option<String>,
    pub runtime: Runtime,
    pub architecture: Architecture,
    pub handler: String,
    pub code: Code,
    pub memory_size_mb: u32,
    pub timeout_secs: u32,
    pub layers: Vec<LayerVersion>,
    pub environment: BTreeMap<String, Token>,
    pub logging_format: LoggingFormat,
}

impl FunctionProps {
    /// Props with the platform defaults: x86_64, 128 MB, 3 s, text logs.
    pub fn new(runtime: Runtime, handler: impl Into<String>, code: Code) -> Self {
        Self {
            function_name: None,
            runtime,
            architecture: Architecture::X86_64,
            handler: handler.into(),
            code,
            memory_size_mb: 128,
            timeout_secs: 3,
            layers: Vec::new(),
            environment: BTreeMap::new(),
            logging_format: LoggingFormat::Text,
        }
    }
}

/// Handle to a declared `AWS::Lambda::Function` and its execution role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    logical_id: String,
    role: Role,
}

impl Function {
    /// Declare the function and its execution role `<id>ServiceRole`.
    ///
    /// # Errors
    ///
    /// Fails if either logical id is taken.
    pub fn declare(stack: &mut Stack, id: &str, props: FunctionProps) -> Result<Self, StackError> {
        let role = Role::declare(
            stack,
            &format!("{id}ServiceRole"),
            LAMBDA_PRINCIPAL,
            vec![lambda_basic_execution_policy()],
        )?;

        let mut p = Map::new();
        p.insert("Code".into(), props.code.to_json());
        p.insert("Role".into(), role.arn().to_json());
        p.insert("Runtime".into(), json!(props.runtime.as_str()));
        p.insert("Handler".into(), json!(props.handler));
        p.insert("Architectures".into(), json!([props.architecture.as_str()]));
        p.insert("MemorySize".into(), json!(props.memory_size_mb));
        p.insert("Timeout".into(), json!(props.timeout_secs));
        if let Some(name) = &props.function_name {
            p.insert("FunctionName".into(), json!(name));
        }
        if !props.layers.is_empty() {
            let layers: Vec<Value> = props.layers.iter().map(|l| l.arn.to_json()).collect();
            p.insert("Layers".into(), Value::Array(layers));
        }
        if !props.environment.is_empty() {
            let vars: Map<String, Value> = props
                .environment
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect();
            p.insert("Environment".into(), json!({ "Variables": vars }));
        }
        if props.logging_format == LoggingFormat::Json {
            p.insert("LoggingConfig".into(), json!({ "LogFormat": "JSON" }));
        }

        stack.add_resource(id, ResourceDecl::new("AWS::Lambda::Function", Value::Object(p)))?;
        Ok(Self {
            logical_id: id.to_owned(),
            role,
        })
    }

    pub fn arn(&self) -> Token {
        Token::get_att(&self.logical_id, "Arn")
    }

    pub fn role(&self) -> &Role {
        &self.role
    }
}

impl Resource for Function {
    fn logical_id(&self) -> &str {
        &self.logical_id
    }
}
