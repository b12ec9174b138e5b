//! The collector: image reference, listening port, and its configuration
//! artifact.
//!
//! The artifact is opaque to the stack beyond a structural sanity check: it
//! must be a YAML mapping with the sections every collector pipeline needs,
//! and no setting in it may hold the ingestion credential (the file refers to
//! the credential through `${env:...}`, which the platform fills in at start).

use std::path::Path;

use common::{StackError, Token};
use serde_yaml::Value as Yaml;
use sha2::{Digest, Sha256};

use crate::config::Credential;

/// Public collector image.
pub const COLLECTOR_IMAGE: &str = "public.ecr.aws/aws-observability/aws-otel-collector:latest";

/// OTLP/HTTP port the collector listens on.
pub const COLLECTOR_PORT: u16 = 4318;

/// Fixed object key of the configuration file.
pub const CONFMAP_KEY: &str = "collector-confmap.yml";

const BUNDLED_CONFMAP: &str = include_str!("../otel/collector-confmap.yml");

const REQUIRED_SECTIONS: &[&str] = &["receivers", "exporters", "service"];

/// Immutable collector configuration file plus its storage key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigArtifact {
    key: String,
    body: String,
    content_hash: String,
}

impl ConfigArtifact {
    /// The configuration shipped with this crate.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::InvalidArtifact`] if the bundled file is malformed.
    pub fn bundled() -> Result<Self, StackError> {
        Self::parse(BUNDLED_CONFMAP)
    }

    /// Read and validate a configuration file from disk.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::InvalidArtifact`] if the file cannot be read or
    /// fails validation.
    pub fn from_path(path: &Path) -> Result<Self, StackError> {
        let body = std::fs::read_to_string(path)
            .map_err(|e| StackError::InvalidArtifact(format!("{}: {e}", path.display())))?;
        Self::parse(&body)
    }

    /// Validate `body` as a collector configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::InvalidArtifact`] if `body` is not a YAML mapping
    /// or lacks one of `receivers`, `exporters`, `service`.
    pub fn parse(body: &str) -> Result<Self, StackError> {
        let doc: Yaml = serde_yaml::from_str(body)
            .map_err(|e| StackError::InvalidArtifact(format!("not valid YAML: {e}")))?;
        let map = doc
            .as_mapping()
            .ok_or_else(|| StackError::InvalidArtifact("top level must be a mapping".into()))?;
        for section in REQUIRED_SECTIONS {
            if !map.contains_key(*section) {
                return Err(StackError::InvalidArtifact(format!("missing `{section}` section")));
            }
        }

        let content_hash = format!("{:x}", Sha256::digest(body.as_bytes()));
        Ok(Self {
            key: CONFMAP_KEY.to_owned(),
            body: body.to_owned(),
            content_hash,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Hex SHA-256 of the body.
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// Reject an artifact with a setting whose value is the credential.
    ///
    /// A value matches if it equals the credential or has it as one of its
    /// whitespace-separated words (`Bearer <key>`). Mapping keys and list
    /// entries such as pipeline component names are not settings and never
    /// match.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::InvalidArtifact`] naming the offending setting.
    pub fn ensure_excludes(&self, credential: &Credential) -> Result<(), StackError> {
        let doc: Yaml = serde_yaml::from_str(&self.body)
            .map_err(|e| StackError::InvalidArtifact(format!("not valid YAML: {e}")))?;
        match find_setting(&doc, credential.expose(), &mut Vec::new()) {
            Some(path) => Err(StackError::InvalidArtifact(format!(
                "`{path}` holds the ingestion credential in plaintext"
            ))),
            None => Ok(()),
        }
    }

    /// `s3://<bucket>.s3.<region>.amazonaws.com/<key>` with a late-bound bucket name.
    pub fn storage_url(&self, bucket_name: Token, region: &str) -> Token {
        Token::join([
            Token::literal("s3://"),
            bucket_name,
            Token::literal(format!(".s3.{region}.amazonaws.com/{}", self.key)),
        ])
    }

    /// The collector start command: `--config <storage url>`.
    pub fn start_command(&self, bucket_name: Token, region: &str) -> Token {
        Token::join([Token::literal("--config "), self.storage_url(bucket_name, region)])
    }
}

/// A value holds the credential when it is the credential or carries it as a
/// whitespace-separated word, as in `Bearer <key>`.
fn holds_credential(value: &str, secret: &str) -> bool {
    value.trim() == secret || value.split_whitespace().any(|w| w == secret)
}

/// Dotted path of the first mapping value holding `secret`.
fn find_setting(node: &Yaml, secret: &str, path: &mut Vec<String>) -> Option<String> {
    match node {
        Yaml::Mapping(map) => {
            for (k, v) in map {
                path.push(k.as_str().map_or_else(|| format!("{k:?}"), str::to_owned));
                let hit = match v {
                    Yaml::String(s) if holds_credential(s, secret) => Some(path.join(".")),
                    _ => find_setting(v, secret, path),
                };
                path.pop();
                if hit.is_some() {
                    return hit;
                }
            }
            None
        }
        Yaml::Sequence(items) => items.iter().find_map(|v| find_setting(v, secret, path)),
        Yaml::Tagged(tagged) => find_setting(&tagged.value, secret, path),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{validate_env, HONEYCOMB_API_KEY, REQUIRED_INPUTS};
    use serde_json::json;

    #[test]
    fn bundled_artifact_is_valid() {
        let a = ConfigArtifact::bundled().unwrap();
        assert_eq!(a.key(), CONFMAP_KEY);
        assert_eq!(a.content_hash().len(), 64);
        assert!(a.body().contains("${env:HONEYCOMB_API_KEY}"));
    }

    #[test]
    fn hash_is_stable_and_content_sensitive() {
        let a = ConfigArtifact::parse("receivers: {}\nexporters: {}\nservice: {}\n").unwrap();
        let b = ConfigArtifact::parse("receivers: {}\nexporters: {}\nservice: {}\n").unwrap();
        let c = ConfigArtifact::parse("receivers: {}\nexporters: {}\nservice: {pipelines: {}}\n")
            .unwrap();
        assert_eq!(a.content_hash(), b.content_hash());
        assert_ne!(a.content_hash(), c.content_hash());
    }

    #[test]
    fn rejects_missing_section() {
        let err = ConfigArtifact::parse("receivers: {}\nexporters: {}\n").unwrap_err();
        assert_eq!(err.kind(), "invalid_artifact");
        assert!(err.to_string().contains("service"));
    }

    #[test]
    fn rejects_non_mapping() {
        assert!(ConfigArtifact::parse("- a\n- b\n").is_err());
        assert!(ConfigArtifact::parse("receivers: [").is_err());
    }

    fn credential(value: &str) -> Credential {
        let env = validate_env(REQUIRED_INPUTS, |_| Some(value.to_string())).unwrap();
        env.credential(HONEYCOMB_API_KEY).unwrap().clone()
    }

    #[test]
    fn rejects_embedded_credential() {
        let cred = credential("hc-literal-key");
        let leaky = ConfigArtifact::parse(concat!(
            "receivers: {}\n",
            "exporters:\n  otlphttp:\n    headers:\n      x-honeycomb-team: hc-literal-key\n",
            "service: {}\n",
        ))
        .unwrap();
        let err = leaky.ensure_excludes(&cred).unwrap_err();
        assert!(err.to_string().contains("exporters.otlphttp.headers.x-honeycomb-team"));
        assert!(!err.to_string().contains("hc-literal-key"));
        assert!(ConfigArtifact::bundled().unwrap().ensure_excludes(&cred).is_ok());
    }

    #[test]
    fn rejects_credential_as_bearer_word() {
        let leaky = ConfigArtifact::parse(concat!(
            "receivers: {}\n",
            "exporters:\n  otlphttp:\n    headers:\n",
            "      authorization: Bearer hc-literal-key\n",
            "service: {}\n",
        ))
        .unwrap();
        assert!(leaky.ensure_excludes(&credential("hc-literal-key")).is_err());
    }

    #[test]
    fn short_credential_matching_other_text_is_accepted() {
        let bundled = ConfigArtifact::bundled().unwrap();
        for value in ["otlp", "batch", "http", "traces", "honeycomb", "0.0.0.0"] {
            assert!(bundled.ensure_excludes(&credential(value)).is_ok(), "{value}");
        }
    }

    #[test]
    fn from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("confmap.yml");
        std::fs::write(&path, "receivers: {}\nexporters: {}\nservice: {}\n").unwrap();
        assert!(ConfigArtifact::from_path(&path).is_ok());
        assert!(ConfigArtifact::from_path(&dir.path().join("missing.yml")).is_err());
    }

    #[test]
    fn start_command_embeds_bucket_region_and_key() {
        let a = ConfigArtifact::bundled().unwrap();
        let cmd = a.start_command(Token::reference("ConfmapBucket"), "eu-central-1");
        assert_eq!(
            cmd.to_json(),
            json!({"Fn::Join": ["", [
                "--config s3://",
                {"Ref": "ConfmapBucket"},
                ".s3.eu-central-1.amazonaws.com/collector-confmap.yml",
            ]]})
        );
        assert_eq!(
            cmd.to_string(),
            "--config s3://${ConfmapBucket}.s3.eu-central-1.amazonaws.com/collector-confmap.yml"
        );
    }
}
