//! Secrets Manager entries fed from masked deploy-time parameters.
//!
//! A [`Secret`] can only be created from a [`SecretParameter`], so the
//! sensitive value never exists as a literal anywhere in the template: the
//! template holds a `Ref` to a `NoEcho` parameter, and the value is supplied
//! to the engine at deploy time.

use common::template::{Parameter, RemovalPolicy, ResourceDecl};
use common::{StackError, Token};
use serde_json::json;

use super::access::{AccessGrant, Action, ResourceScope};
use super::iam::Role;
use super::Resource;
use crate::graph::Stack;

/// Handle to a declared masked parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretParameter {
    logical_id: String,
}

impl SecretParameter {
    /// # Errors
    ///
    /// Fails if `id` is invalid or already declared.
    pub fn declare(stack: &mut Stack, id: &str, description: &str) -> Result<Self, StackError> {
        stack.add_parameter(id, Parameter::secret_string(description))?;
        Ok(Self {
            logical_id: id.to_owned(),
        })
    }

    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }
}

/// Handle to a declared `AWS::SecretsManager::Secret`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Secret {
    logical_id: String,
}

impl Secret {
    /// Declare a destroy-on-teardown secret named `secret_name` whose value is
    /// the deploy-time value of `value`.
    ///
    /// # Errors
    ///
    /// Fails if `id` is invalid or already declared.
    pub fn from_parameter(
        stack: &mut Stack,
        id: &str,
        secret_name: &str,
        value: &SecretParameter,
    ) -> Result<Self, StackError> {
        let props = json!({
            "Name": secret_name,
            "SecretString": Token::reference(&value.logical_id).to_json(),
        });
        stack.add_resource(
            id,
            ResourceDecl::new("AWS::SecretsManager::Secret", props)
                .with_removal_policy(RemovalPolicy::Delete),
        )?;
        Ok(Self {
            logical_id: id.to_owned(),
        })
    }

    /// The secret's ARN (`Ref` of a secret resolves to its ARN).
    pub fn arn(&self) -> Token {
        Token::reference(&self.logical_id)
    }

    /// Allow `role` to read this secret's value, and nothing else.
    ///
    /// # Errors
    ///
    /// Fails if `role` is not declared in `stack`.
    pub fn grant_read(&self, stack: &mut Stack, role: &Role) -> Result<AccessGrant, StackError> {
        let grant = AccessGrant::new(
            role.principal(),
            ResourceScope::Secret {
                secret_arn: self.arn(),
            },
            [Action::SecretsGetSecretValue],
        )?;
        role.add_to_policy(stack, "SecretAccess", &grant)?;
        Ok(grant)
    }
}

impl Resource for Secret {
    fn logical_id(&self) -> &str {
        &self.logical_id
    }
}
