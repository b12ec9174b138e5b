//! CloudFormation template document types.
//!
//! These types are serialised as the template handed to the provisioning
//! engine. All maps are ordered so that synthesising the same stack twice
//! produces byte-identical output.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::Value;

use crate::token::{collect_references, Token};

/// Template format version accepted by the engine.
pub const FORMAT_VERSION: &str = "2010-09-09";

// ---------------------------------------------------------------------------
// Template
// ---------------------------------------------------------------------------

/// A complete template document.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub format_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, Parameter>,
    pub resources: BTreeMap<String, ResourceDecl>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, Output>,
}

impl Template {
    /// Construct an empty template with the current format version.
    pub fn new(description: Option<String>) -> Self {
        Self {
            format_version: FORMAT_VERSION.into(),
            description,
            parameters: BTreeMap::new(),
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    /// Serialise as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns the serializer's error unchanged.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// A deploy-time input declared by the template.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Parameter {
    #[serde(rename = "Type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Masks the supplied value in engine consoles and API responses.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub no_echo: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u32>,
}

impl Parameter {
    /// A `String` parameter whose value is masked and must be non-empty.
    pub fn secret_string(description: impl Into<String>) -> Self {
        Self {
            kind: "String".into(),
            description: Some(description.into()),
            no_echo: true,
            min_length: Some(1),
        }
    }
}

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

/// What the engine does with a resource's physical counterpart when the
/// resource leaves the stack.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum RemovalPolicy {
    Delete,
    Retain,
}

/// A single resource declaration.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ResourceDecl {
    #[serde(rename = "Type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub properties: Value,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub depends_on: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<RemovalPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_replace_policy: Option<RemovalPolicy>,
}

impl ResourceDecl {
    pub fn new(kind: impl Into<String>, properties: Value) -> Self {
        Self {
            kind: kind.into(),
            properties,
            depends_on: BTreeSet::new(),
            deletion_policy: None,
            update_replace_policy: None,
        }
    }

    /// Apply the same policy on stack deletion and on replacement.
    pub fn with_removal_policy(mut self, policy: RemovalPolicy) -> Self {
        self.deletion_policy = Some(policy);
        self.update_replace_policy = Some(policy);
        self
    }

    /// Whether tearing down the stack deletes the physical resource.
    ///
    /// The engine deletes by default; only an explicit `Retain` keeps it.
    pub fn is_deleted_on_teardown(&self) -> bool {
        self.deletion_policy != Some(RemovalPolicy::Retain)
    }

    /// Logical ids referenced from the properties (implicit dependencies).
    pub fn property_references(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        collect_references(&self.properties, &mut out);
        out
    }

    /// Explicit plus implicit dependencies.
    pub fn dependencies(&self) -> BTreeSet<String> {
        let mut out = self.property_references();
        out.extend(self.depends_on.iter().cloned());
        out
    }
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

/// A value reported back by the engine after provisioning.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Output {
    pub value: Token,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_sections_are_omitted() {
        let t = Template::new(None);
        let v: Value = serde_json::to_value(&t).unwrap();
        assert_eq!(v["AWSTemplateFormatVersion"], FORMAT_VERSION);
        assert!(v.get("Parameters").is_none());
        assert!(v.get("Outputs").is_none());
        assert!(v.get("Description").is_none());
        assert_eq!(v["Resources"], json!({}));
    }

    #[test]
    fn pretty_json_is_returned_not_defaulted() {
        let mut t = Template::new(Some("d".into()));
        t.resources
            .insert("Bucket".into(), ResourceDecl::new("AWS::S3::Bucket", json!({})));
        let body = t.to_json_pretty().unwrap();
        let v: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(v, serde_json::to_value(&t).unwrap());
    }

    #[test]
    fn resource_serialises_policies_and_depends_on() {
        let mut r = ResourceDecl::new("AWS::S3::Bucket", json!({}))
            .with_removal_policy(RemovalPolicy::Delete);
        r.depends_on.insert("Other".into());
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["Type"], "AWS::S3::Bucket");
        assert_eq!(v["DeletionPolicy"], "Delete");
        assert_eq!(v["UpdateReplacePolicy"], "Delete");
        assert_eq!(v["DependsOn"], json!(["Other"]));
    }

    #[test]
    fn default_policy_deletes_on_teardown() {
        let r = ResourceDecl::new("AWS::IAM::Role", json!({}));
        assert!(r.is_deleted_on_teardown());
        let kept = r.with_removal_policy(RemovalPolicy::Retain);
        assert!(!kept.is_deleted_on_teardown());
    }

    #[test]
    fn dependencies_merge_explicit_and_implicit() {
        let mut r = ResourceDecl::new(
            "AWS::AppRunner::Service",
            json!({"Role": {"Fn::GetAtt": ["Role", "Arn"]}}),
        );
        r.depends_on.insert("Config".into());
        let deps: Vec<String> = r.dependencies().into_iter().collect();
        assert_eq!(deps, vec!["Config".to_string(), "Role".to_string()]);
    }

    #[test]
    fn secret_parameter_is_masked() {
        let p = Parameter::secret_string("api key");
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v["NoEcho"], true);
        assert_eq!(v["MinLength"], 1);
        assert_eq!(v["Type"], "String");
    }
}
