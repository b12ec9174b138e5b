//! Cloud assembly: the synthesized template plus a manifest, written to the
//! output directory for the deploy engine to pick up.
//!
//! ```text
//! <out>/
//!   <stack>.template.json
//!   manifest.json
//! ```
//!
//! # Module invariants
//!
//! - Parameter values are never written. The manifest only names the
//!   environment variable each parameter is read from at deploy time.
//! - Both files are rendered fully in memory before the first write.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use common::template::Template;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::info;

pub const MANIFEST_FILE: &str = "manifest.json";

/// Failures writing the assembly.
#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to render assembly: {0}")]
    Render(#[from] serde_json::Error),
}

/// Where a deploy-time parameter value comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterSource {
    pub from_environment: String,
}

/// Description of one synthesized stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub stack_name: String,
    pub region: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    pub template_file: String,
    /// Hex SHA-256 of the template file contents.
    pub template_hash: String,
    pub parameters: BTreeMap<String, ParameterSource>,
}

/// Target of one stack's assembly.
#[derive(Debug, Clone)]
pub struct StackTarget<'a> {
    pub stack_name: &'a str,
    pub region: &'a str,
    pub account: Option<&'a str>,
    /// Parameter logical id to the environment variable that supplies it.
    pub parameter_sources: &'a [(&'a str, &'a str)],
}

/// Paths of a written assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assembly {
    pub template_path: PathBuf,
    pub manifest_path: PathBuf,
    pub manifest: Manifest,
}

/// Render `template` and its manifest.
///
/// # Errors
///
/// Returns [`AssemblyError::Render`] if the template or manifest cannot be
/// serialised.
pub fn render(
    template: &Template,
    target: &StackTarget<'_>,
) -> Result<(String, Manifest, String), AssemblyError> {
    let body = template.to_json_pretty()?;
    let manifest = Manifest {
        stack_name: target.stack_name.to_owned(),
        region: target.region.to_owned(),
        account: target.account.map(str::to_owned),
        template_file: format!("{}.template.json", target.stack_name),
        template_hash: format!("{:x}", Sha256::digest(body.as_bytes())),
        parameters: target
            .parameter_sources
            .iter()
            .filter(|(id, _)| template.parameters.contains_key(*id))
            .map(|(id, var)| {
                (
                    (*id).to_owned(),
                    ParameterSource {
                        from_environment: (*var).to_owned(),
                    },
                )
            })
            .collect(),
    };
    let manifest_body = serde_json::to_string_pretty(&manifest)?;
    Ok((body, manifest, manifest_body))
}

/// Write the assembly for `template` into `out_dir`, creating it if needed.
///
/// # Errors
///
/// Returns [`AssemblyError`] if rendering or any filesystem write fails.
pub fn write(
    out_dir: &Path,
    template: &Template,
    target: &StackTarget<'_>,
) -> Result<Assembly, AssemblyError> {
    let (body, manifest, manifest_body) = render(template, target)?;

    fs::create_dir_all(out_dir).map_err(|source| AssemblyError::Io {
        path: out_dir.to_path_buf(),
        source,
    })?;

    let template_path = out_dir.join(&manifest.template_file);
    write_file(&template_path, &body)?;
    let manifest_path = out_dir.join(MANIFEST_FILE);
    write_file(&manifest_path, &manifest_body)?;

    info!(
        stack = %manifest.stack_name,
        template = %template_path.display(),
        hash = %manifest.template_hash,
        "cloud assembly written"
    );

    Ok(Assembly {
        template_path,
        manifest_path,
        manifest,
    })
}

fn write_file(path: &Path, contents: &str) -> Result<(), AssemblyError> {
    fs::write(path, contents).map_err(|source| AssemblyError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::template::{Parameter, ResourceDecl};
    use serde_json::{json, Value};

    fn template() -> Template {
        let mut t = Template::new(Some("test".into()));
        t.parameters.insert("ApiKey".into(), Parameter::secret_string("key"));
        t.resources.insert(
            "Bucket".into(),
            ResourceDecl::new("AWS::S3::Bucket", json!({})),
        );
        t
    }

    fn target() -> StackTarget<'static> {
        StackTarget {
            stack_name: "demo",
            region: "eu-central-1",
            account: None,
            parameter_sources: &[("ApiKey", "API_KEY"), ("Unused", "UNUSED")],
        }
    }

    #[test]
    fn writes_template_and_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("cdk.out");
        let a = write(&out, &template(), &target()).unwrap();

        assert_eq!(a.template_path, out.join("demo.template.json"));
        let body = fs::read_to_string(&a.template_path).unwrap();
        assert_eq!(body, template().to_json_pretty().unwrap());

        let manifest: Value =
            serde_json::from_str(&fs::read_to_string(&a.manifest_path).unwrap()).unwrap();
        assert_eq!(manifest["stackName"], "demo");
        assert_eq!(manifest["templateFile"], "demo.template.json");
        assert_eq!(manifest["templateHash"], format!("{:x}", Sha256::digest(body.as_bytes())));
        assert_eq!(manifest["parameters"], json!({"ApiKey": {"fromEnvironment": "API_KEY"}}));
        assert!(manifest.get("account").is_none());
    }

    #[test]
    fn rewriting_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), &template(), &target()).unwrap();
        let first = fs::read(&a.template_path).unwrap();
        let first_manifest = fs::read(&a.manifest_path).unwrap();
        let b = write(dir.path(), &template(), &target()).unwrap();
        assert_eq!(first, fs::read(&b.template_path).unwrap());
        assert_eq!(first_manifest, fs::read(&b.manifest_path).unwrap());
    }

    #[test]
    fn render_failure_is_reported_not_swallowed() {
        let cause = serde_json::from_str::<Value>("{").unwrap_err();
        let err = AssemblyError::from(cause);
        assert!(matches!(err, AssemblyError::Render(_)));
        assert!(err.to_string().starts_with("failed to render assembly"));
    }

    #[test]
    fn rendered_body_matches_template() {
        let (body, manifest, _) = render(&template(), &target()).unwrap();
        assert!(!body.is_empty());
        let parsed: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["Resources"]["Bucket"]["Type"], "AWS::S3::Bucket");
        assert_eq!(manifest.template_hash, format!("{:x}", Sha256::digest(body.as_bytes())));
    }

    #[test]
    fn unwritable_directory_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();
        let err = write(&blocker.join("out"), &template(), &target()).unwrap_err();
        assert!(matches!(err, AssemblyError::Io { .. }));
    }
}
