//! IAM roles assumed by service principals.

use common::template::ResourceDecl;
use common::{Pseudo, StackError, Token};
use serde_json::{json, Value};

use super::access::{AccessGrant, Principal};
use super::Resource;
use crate::graph::Stack;

/// Service principal App Runner instances run as.
pub const APPRUNNER_TASKS_PRINCIPAL: &str = "tasks.apprunner.amazonaws.com";

/// Service principal Lambda functions run as.
pub const LAMBDA_PRINCIPAL: &str = "lambda.amazonaws.com";

/// Managed policy allowing a function to write its own logs.
pub fn lambda_basic_execution_policy() -> Token {
    Token::join([
        Token::literal("arn:"),
        Token::Pseudo(Pseudo::Partition),
        Token::literal(":iam::aws:policy/service-role/AWSLambdaBasicExecutionRole"),
    ])
}

/// Handle to a declared `AWS::IAM::Role`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    logical_id: String,
}

impl Role {
    /// Declare a role trusted by `service_principal`.
    ///
    /// # Errors
    ///
    /// Fails if `id` is invalid or already declared.
    pub fn declare(
        stack: &mut Stack,
        id: &str,
        service_principal: &str,
        managed_policies: Vec<Token>,
    ) -> Result<Self, StackError> {
        let mut props = json!({
            "AssumeRolePolicyDocument": {
                "Version": "2012-10-17",
                "Statement": [{
                    "Effect": "Allow",
                    "Principal": { "Service": service_principal },
                    "Action": "sts:AssumeRole",
                }],
            },
        });
        if !managed_policies.is_empty() {
            props["ManagedPolicyArns"] =
                Value::Array(managed_policies.iter().map(Token::to_json).collect());
        }
        stack.add_resource(id, ResourceDecl::new("AWS::IAM::Role", props))?;
        Ok(Self {
            logical_id: id.to_owned(),
        })
    }

    pub fn arn(&self) -> Token {
        Token::get_att(&self.logical_id, "Arn")
    }

    /// This role as a grant principal.
    pub fn principal(&self) -> Principal {
        Principal {
            role_id: self.logical_id.clone(),
            role_arn: self.arn(),
        }
    }

    /// Append `grant` to the inline policy `policy_name`, creating the policy
    /// on first use.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::GrantTooBroad`] if the grant was issued to a
    /// different principal, or [`StackError::DanglingReference`] if the role
    /// is not declared in `stack`.
    pub fn add_to_policy(
        &self,
        stack: &mut Stack,
        policy_name: &str,
        grant: &AccessGrant,
    ) -> Result<(), StackError> {
        if grant.principal().role_id != self.logical_id {
            return Err(StackError::GrantTooBroad(format!(
                "grant for {} attached to role {}",
                grant.principal().role_id,
                self.logical_id
            )));
        }
        let decl = stack
            .resource_mut(&self.logical_id)
            .ok_or_else(|| StackError::DanglingReference {
                from: policy_name.to_owned(),
                target: self.logical_id.clone(),
            })?;

        let malformed = |detail: &str| StackError::MalformedDeclaration {
            id: self.logical_id.clone(),
            detail: detail.to_owned(),
        };
        let props = decl
            .properties
            .as_object_mut()
            .ok_or_else(|| malformed("properties are not an object"))?;
        let policies = props
            .entry("Policies")
            .or_insert_with(|| Value::Array(Vec::new()));
        let Some(policies) = policies.as_array_mut() else {
            return Err(malformed("Policies is not a list"));
        };

        let existing = policies
            .iter_mut()
            .find(|p| p["PolicyName"] == policy_name);
        match existing {
            Some(policy) => {
                let Some(statements) = policy
                    .get_mut("PolicyDocument")
                    .and_then(|doc| doc.get_mut("Statement"))
                    .and_then(Value::as_array_mut)
                else {
                    return Err(malformed("policy statements are not a list"));
                };
                statements.push(grant.identity_statement());
            }
            None => policies.push(json!({
                "PolicyName": policy_name,
                "PolicyDocument": {
                    "Version": "2012-10-17",
                    "Statement": [grant.identity_statement()],
                },
            })),
        }
        Ok(())
    }
}

impl Resource for Role {
    fn logical_id(&self) -> &str {
        &self.logical_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::access::{Action, ResourceScope};

    fn stack() -> Stack {
        Stack::new("t", "eu-central-1", None)
    }

    #[test]
    fn trust_policy_names_service() {
        let mut s = stack();
        let role =
            Role::declare(&mut s, "InstanceRole", APPRUNNER_TASKS_PRINCIPAL, vec![]).unwrap();
        let props = &s.resource(role.logical_id()).unwrap().properties;
        assert_eq!(
            props["AssumeRolePolicyDocument"]["Statement"][0]["Principal"]["Service"],
            APPRUNNER_TASKS_PRINCIPAL
        );
        assert!(props.get("ManagedPolicyArns").is_none());
        assert!(props.get("Policies").is_none());
    }

    #[test]
    fn inline_policy_accumulates_statements() {
        let mut s = stack();
        let role = Role::declare(
            &mut s,
            "Role",
            LAMBDA_PRINCIPAL,
            vec![lambda_basic_execution_policy()],
        )
        .unwrap();
        let put = AccessGrant::new(
            role.principal(),
            ResourceScope::Object {
                bucket_arn: Token::get_att("Bucket", "Arn"),
                key: "a.yml".into(),
            },
            [Action::S3PutObject],
        )
        .unwrap();
        role.add_to_policy(&mut s, "Write", &put).unwrap();
        role.add_to_policy(&mut s, "Write", &put).unwrap();
        let props = &s.resource("Role").unwrap().properties;
        assert_eq!(props["Policies"].as_array().unwrap().len(), 1);
        assert_eq!(
            props["Policies"][0]["PolicyDocument"]["Statement"].as_array().unwrap().len(),
            2
        );
        assert_eq!(props["ManagedPolicyArns"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn grant_for_other_role_is_rejected() {
        let mut s = stack();
        let a = Role::declare(&mut s, "A", LAMBDA_PRINCIPAL, vec![]).unwrap();
        let b = Role::declare(&mut s, "B", LAMBDA_PRINCIPAL, vec![]).unwrap();
        let grant = AccessGrant::new(
            a.principal(),
            ResourceScope::Secret {
                secret_arn: Token::reference("Secret"),
            },
            [Action::SecretsGetSecretValue],
        )
        .unwrap();
        assert!(b.add_to_policy(&mut s, "P", &grant).is_err());
    }

    fn secret_grant(role: &Role) -> AccessGrant {
        AccessGrant::new(
            role.principal(),
            ResourceScope::Secret {
                secret_arn: Token::reference("Secret"),
            },
            [Action::SecretsGetSecretValue],
        )
        .unwrap()
    }

    #[test]
    fn non_object_properties_are_malformed() {
        let mut s = stack();
        let role = Role::declare(&mut s, "Role", LAMBDA_PRINCIPAL, vec![]).unwrap();
        s.resource_mut("Role").unwrap().properties = json!("not an object");
        let err = role.add_to_policy(&mut s, "P", &secret_grant(&role)).unwrap_err();
        assert_eq!(err.kind(), "malformed_declaration");
        assert!(err.to_string().contains("Role"));
    }

    #[test]
    fn non_list_policies_are_malformed() {
        let mut s = stack();
        let role = Role::declare(&mut s, "Role", LAMBDA_PRINCIPAL, vec![]).unwrap();
        s.resource_mut("Role").unwrap().properties["Policies"] = json!({});
        let err = role.add_to_policy(&mut s, "P", &secret_grant(&role)).unwrap_err();
        assert_eq!(err.kind(), "malformed_declaration");
    }
}
