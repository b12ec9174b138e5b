//! Least-privilege access grants.
//!
//! Actions and resource scopes are closed enums: a grant can only name the
//! concrete S3 or Secrets Manager operations listed here, scoped to one
//! bucket, that bucket's objects, one object, or one secret. Wildcard actions cannot be
//! expressed, and wildcard resource ARNs are rejected at construction.

use std::collections::BTreeSet;
use std::str::FromStr;

use common::{StackError, Token};
use serde_json::{json, Value};

use crate::config::UnknownOption;

/// A single permitted API operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Action {
    S3GetObject,
    S3PutObject,
    S3DeleteObject,
    S3ListBucket,
    SecretsGetSecretValue,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::S3GetObject => "s3:GetObject",
            Action::S3PutObject => "s3:PutObject",
            Action::S3DeleteObject => "s3:DeleteObject",
            Action::S3ListBucket => "s3:ListBucket",
            Action::SecretsGetSecretValue => "secretsmanager:GetSecretValue",
        }
    }

    /// Returns `true` for actions that cannot modify or enumerate anything.
    pub fn is_read(self) -> bool {
        matches!(self, Action::S3GetObject | Action::SecretsGetSecretValue)
    }

    fn applies_to(self, scope: &ResourceScope) -> bool {
        match self {
            Action::S3GetObject | Action::S3PutObject | Action::S3DeleteObject => matches!(
                scope,
                ResourceScope::ObjectsOf { .. } | ResourceScope::Object { .. }
            ),
            Action::S3ListBucket => matches!(scope, ResourceScope::Bucket { .. }),
            Action::SecretsGetSecretValue => matches!(scope, ResourceScope::Secret { .. }),
        }
    }
}

/// The resource set a grant applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceScope {
    /// The bucket itself, for bucket-level operations such as listing.
    Bucket { bucket_arn: Token },
    /// Every object inside one bucket (`<bucket arn>/*`).
    ObjectsOf { bucket_arn: Token },
    /// Exactly one object.
    Object { bucket_arn: Token, key: String },
    /// Exactly one secret.
    Secret { secret_arn: Token },
}

impl ResourceScope {
    /// The ARN (or ARN pattern) the statement's `Resource` renders to.
    pub fn arn(&self) -> Token {
        match self {
            ResourceScope::Bucket { bucket_arn } => bucket_arn.clone(),
            ResourceScope::ObjectsOf { bucket_arn } => {
                Token::join([bucket_arn.clone(), Token::literal("/*")])
            }
            ResourceScope::Object { bucket_arn, key } => {
                Token::join([bucket_arn.clone(), Token::literal(format!("/{key}"))])
            }
            ResourceScope::Secret { secret_arn } => secret_arn.clone(),
        }
    }

    /// The base ARN the scope is anchored to.
    pub fn base_arn(&self) -> &Token {
        match self {
            ResourceScope::Bucket { bucket_arn }
            | ResourceScope::ObjectsOf { bucket_arn }
            | ResourceScope::Object { bucket_arn, .. } => bucket_arn,
            ResourceScope::Secret { secret_arn } => secret_arn,
        }
    }

    fn check_anchored(&self) -> Result<(), StackError> {
        let literal_parts: Vec<&str> = match self.base_arn() {
            Token::Literal(s) => vec![s.as_str()],
            Token::Join(parts) => parts.iter().filter_map(Token::as_literal).collect(),
            _ => Vec::new(),
        };
        if self.base_arn().as_literal().is_some_and(|s| s.trim().is_empty()) {
            return Err(StackError::GrantTooBroad("empty resource ARN".into()));
        }
        if literal_parts.iter().any(|s| s.contains('*')) {
            return Err(StackError::GrantTooBroad(format!(
                "resource ARN {} contains a wildcard",
                self.base_arn()
            )));
        }
        if let ResourceScope::Object { key, .. } = self {
            if key.is_empty() || key.contains('*') {
                return Err(StackError::GrantTooBroad(format!(
                    "object key {key:?} is not a single object"
                )));
            }
        }
        Ok(())
    }
}

/// Who receives a grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// Logical id of the role.
    pub role_id: String,
    /// ARN token of the role, for resource-policy statements.
    pub role_arn: Token,
}

/// `{principal, resource, actions}`: one allow statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessGrant {
    principal: Principal,
    scope: ResourceScope,
    actions: BTreeSet<Action>,
}

impl AccessGrant {
    /// Build a grant.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::GrantTooBroad`] if `actions` is empty, names an
    /// action that does not apply to `scope`, or the scope's ARN contains a
    /// wildcard.
    pub fn new<I>(
        principal: Principal,
        scope: ResourceScope,
        actions: I,
    ) -> Result<Self, StackError>
    where
        I: IntoIterator<Item = Action>,
    {
        let actions: BTreeSet<Action> = actions.into_iter().collect();
        if actions.is_empty() {
            return Err(StackError::GrantTooBroad("grant names no actions".into()));
        }
        if let Some(a) = actions.iter().find(|a| !a.applies_to(&scope)) {
            return Err(StackError::GrantTooBroad(format!(
                "{} does not apply to {}",
                a.as_str(),
                scope.arn()
            )));
        }
        scope.check_anchored()?;
        Ok(Self {
            principal,
            scope,
            actions,
        })
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn scope(&self) -> &ResourceScope {
        &self.scope
    }

    pub fn actions(&self) -> impl Iterator<Item = Action> + '_ {
        self.actions.iter().copied()
    }

    /// Returns `true` if every granted action is a read.
    pub fn is_read_only(&self) -> bool {
        self.actions.iter().all(|a| a.is_read())
    }

    /// Render as an identity-policy statement (no `Principal`).
    pub fn identity_statement(&self) -> Value {
        json!({
            "Effect": "Allow",
            "Action": self.rendered_actions(),
            "Resource": self.scope.arn().to_json(),
        })
    }

    /// Render as a resource-policy statement naming the principal.
    pub fn resource_statement(&self) -> Value {
        json!({
            "Effect": "Allow",
            "Principal": { "AWS": self.principal.role_arn.to_json() },
            "Action": self.rendered_actions(),
            "Resource": self.scope.arn().to_json(),
        })
    }

    fn rendered_actions(&self) -> Value {
        let names: Vec<&str> = self.actions.iter().map(|a| a.as_str()).collect();
        match names.as_slice() {
            [single] => json!(single),
            _ => json!(names),
        }
    }
}

/// Where a grant is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantStrategy {
    /// Inline policy on the principal's role.
    InlinePolicy,
    /// Statement in the target resource's own policy.
    ResourcePolicy,
}

impl FromStr for GrantStrategy {
    type Err = UnknownOption;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "inline-policy" | "inline" => Ok(GrantStrategy::InlinePolicy),
            "resource-policy" | "resource" => Ok(GrantStrategy::ResourcePolicy),
            other => Err(UnknownOption(other.to_owned())),
        }
    }
}
