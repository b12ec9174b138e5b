//! App Runner services started from public container images.

use std::collections::BTreeMap;

use common::template::ResourceDecl;
use common::{StackError, Token};
use serde_json::{json, Map, Value};

use super::iam::Role;
use super::secrets::Secret;
use super::Resource;
use crate::graph::Stack;

/// Image settings for the service container.
#[derive(Debug, Clone, Default)]
pub struct ImageConfiguration {
    pub port: u16,
    pub start_command: Option<Token>,
    /// Variables resolved from Secrets Manager by the platform at container start.
    pub environment_secrets: BTreeMap<String, Token>,
}

impl ImageConfiguration {
    /// Bind `name` in the container environment to the value of `secret`.
    pub fn with_secret(mut self, name: &str, secret: &Secret) -> Self {
        self.environment_secrets.insert(name.to_owned(), secret.arn());
        self
    }

    fn to_json(&self) -> Value {
        let mut c = Map::new();
        c.insert("Port".into(), json!(self.port.to_string()));
        if let Some(cmd) = &self.start_command {
            c.insert("StartCommand".into(), cmd.to_json());
        }
        if !self.environment_secrets.is_empty() {
            let pairs: Vec<Value> = self
                .environment_secrets
                .iter()
                .map(|(k, v)| json!({ "Name": k, "Value": v.to_json() }))
                .collect();
            c.insert("RuntimeEnvironmentSecrets".into(), Value::Array(pairs));
        }
        Value::Object(c)
    }
}

/// Everything needed to declare a [`Service`].
#[derive(Debug, Clone)]
pub struct ServiceProps {
    /// Image reference in a public ECR repository.
    pub image_identifier: String,
    pub image_configuration: ImageConfiguration,
    /// Runtime identity of the running container.
    pub instance_role: Role,
}

/// Handle to a declared `AWS::AppRunner::Service`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    logical_id: String,
}

impl Service {
    /// # Errors
    ///
    /// Fails if `id` is invalid or already declared.
    pub fn declare(stack: &mut Stack, id: &str, props: ServiceProps) -> Result<Self, StackError> {
        let body = json!({
            "SourceConfiguration": {
                "AutoDeploymentsEnabled": false,
                "ImageRepository": {
                    "ImageIdentifier": props.image_identifier,
                    "ImageRepositoryType": "ECR_PUBLIC",
                    "ImageConfiguration": props.image_configuration.to_json(),
                },
            },
            "InstanceConfiguration": {
                "InstanceRoleArn": props.instance_role.arn().to_json(),
            },
        });
        stack.add_resource(id, ResourceDecl::new("AWS::AppRunner::Service", body))?;
        Ok(Self {
            logical_id: id.to_owned(),
        })
    }

    /// The assigned public host name, known only after provisioning.
    pub fn service_url(&self) -> Token {
        Token::get_att(&self.logical_id, "ServiceUrl")
    }
}

impl Resource for Service {
    fn logical_id(&self) -> &str {
        &self.logical_id
    }
}
