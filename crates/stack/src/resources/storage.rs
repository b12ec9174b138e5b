//! Object storage for the collector configuration.
//!
//! # Lifecycle
//!
//! 1. [`Bucket`] is private (public access fully blocked) and carries a
//!    `Delete` removal policy: tearing down the stack deletes it.
//! 2. [`ConfigObject`] writes exactly one object into the bucket through a
//!    small writer function. When the stack is torn down the writer empties
//!    the whole bucket, so the engine can delete it even if other objects
//!    were put there.
//! 3. Redeploying with an unchanged body changes no property, so the engine
//!    issues no update.

use common::template::{RemovalPolicy, ResourceDecl};
use common::{StackError, Token};
use serde_json::{json, Value};

use super::access::{AccessGrant, Action, ResourceScope};
use super::lambda::{Architecture, Code, Function, FunctionProps, Runtime};
use super::Resource;
use crate::collector::ConfigArtifact;
use crate::graph::Stack;

/// Inline source of the object writer.
const CONFIG_OBJECT_HANDLER: &str = include_str!("../../assets/config_object_handler.py");

// ---------------------------------------------------------------------------
// Bucket
// ---------------------------------------------------------------------------

/// Handle to a declared `AWS::S3::Bucket`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    logical_id: String,
}

impl Bucket {
    /// Declare a private, destroy-on-teardown bucket.
    ///
    /// # Errors
    ///
    /// Fails if `id` is invalid or already declared.
    pub fn declare(stack: &mut Stack, id: &str) -> Result<Self, StackError> {
        let props = json!({
            "BucketEncryption": {
                "ServerSideEncryptionConfiguration": [{
                    "ServerSideEncryptionByDefault": { "SSEAlgorithm": "AES256" },
                }],
            },
            "OwnershipControls": {
                "Rules": [{ "ObjectOwnership": "BucketOwnerEnforced" }],
            },
            "PublicAccessBlockConfiguration": {
                "BlockPublicAcls": true,
                "BlockPublicPolicy": true,
                "IgnorePublicAcls": true,
                "RestrictPublicBuckets": true,
            },
        });
        stack.add_resource(
            id,
            ResourceDecl::new("AWS::S3::Bucket", props).with_removal_policy(RemovalPolicy::Delete),
        )?;
        Ok(Self {
            logical_id: id.to_owned(),
        })
    }

    /// The generated bucket name.
    pub fn name(&self) -> Token {
        Token::reference(&self.logical_id)
    }

    pub fn arn(&self) -> Token {
        Token::get_att(&self.logical_id, "Arn")
    }

    /// Scope covering the bucket itself, for listing.
    pub fn bucket_scope(&self) -> ResourceScope {
        ResourceScope::Bucket {
            bucket_arn: self.arn(),
        }
    }

    /// Scope covering every object in this bucket and nothing else.
    pub fn objects_scope(&self) -> ResourceScope {
        ResourceScope::ObjectsOf {
            bucket_arn: self.arn(),
        }
    }

    /// Scope covering exactly one object.
    pub fn object_scope(&self, key: &str) -> ResourceScope {
        ResourceScope::Object {
            bucket_arn: self.arn(),
            key: key.to_owned(),
        }
    }
}

impl Resource for Bucket {
    fn logical_id(&self) -> &str {
        &self.logical_id
    }
}

// ---------------------------------------------------------------------------
// Bucket policy
// ---------------------------------------------------------------------------

/// Handle to a declared `AWS::S3::BucketPolicy`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketPolicy {
    logical_id: String,
}

impl BucketPolicy {
    /// Declare a resource policy on `bucket` holding `grants`.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::GrantTooBroad`] if a grant is scoped outside
    /// `bucket`.
    pub fn declare(
        stack: &mut Stack,
        id: &str,
        bucket: &Bucket,
        grants: &[AccessGrant],
    ) -> Result<Self, StackError> {
        if let Some(g) = grants.iter().find(|g| *g.scope().base_arn() != bucket.arn()) {
            return Err(StackError::GrantTooBroad(format!(
                "statement for {} placed on policy of bucket {}",
                g.scope().arn(),
                bucket.logical_id()
            )));
        }
        let statements: Vec<Value> = grants.iter().map(AccessGrant::resource_statement).collect();
        let props = json!({
            "Bucket": bucket.name().to_json(),
            "PolicyDocument": {
                "Version": "2012-10-17",
                "Statement": statements,
            },
        });
        stack.add_resource(id, ResourceDecl::new("AWS::S3::BucketPolicy", props))?;
        Ok(Self {
            logical_id: id.to_owned(),
        })
    }
}

impl Resource for BucketPolicy {
    fn logical_id(&self) -> &str {
        &self.logical_id
    }
}

// ---------------------------------------------------------------------------
// Config object
// ---------------------------------------------------------------------------

/// Handle to a declared `Custom::ConfigObject`: one object written into a
/// bucket at provisioning time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigObject {
    logical_id: String,
    writer: Function,
}

impl ConfigObject {
    /// Declare the object plus its writer function (`<id>Writer`).
    ///
    /// The writer's role may put `artifact.key()` only, and may list and
    /// delete objects of `bucket` so teardown leaves it empty.
    ///
    /// # Errors
    ///
    /// Fails if any of the three logical ids is taken.
    pub fn declare(
        stack: &mut Stack,
        id: &str,
        bucket: &Bucket,
        artifact: &ConfigArtifact,
    ) -> Result<Self, StackError> {
        let mut writer_props = FunctionProps::new(
            Runtime::Python313,
            "index.handler",
            Code::Inline(CONFIG_OBJECT_HANDLER.to_owned()),
        );
        writer_props.architecture = Architecture::Arm64;
        writer_props.timeout_secs = 60;
        let writer = Function::declare(stack, &format!("{id}Writer"), writer_props)?;

        let principal = writer.role().principal();
        let grants = [
            AccessGrant::new(
                principal.clone(),
                bucket.object_scope(artifact.key()),
                [Action::S3PutObject],
            )?,
            AccessGrant::new(
                principal.clone(),
                bucket.objects_scope(),
                [Action::S3DeleteObject],
            )?,
            AccessGrant::new(principal, bucket.bucket_scope(), [Action::S3ListBucket])?,
        ];
        for grant in &grants {
            writer.role().add_to_policy(stack, "ConfigObjectWrite", grant)?;
        }

        let props = json!({
            "ServiceToken": writer.arn().to_json(),
            "Bucket": bucket.name().to_json(),
            "Key": artifact.key(),
            "Body": artifact.body(),
            "ContentHash": artifact.content_hash(),
        });
        stack.add_resource(
            id,
            ResourceDecl::new("Custom::ConfigObject", props)
                .with_removal_policy(RemovalPolicy::Delete),
        )?;
        Ok(Self {
            logical_id: id.to_owned(),
            writer,
        })
    }

    pub fn writer(&self) -> &Function {
        &self.writer
    }
}

impl Resource for ConfigObject {
    fn logical_id(&self) -> &str {
        &self.logical_id
    }
}
