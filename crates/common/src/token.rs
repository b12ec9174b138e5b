//! Deferred values resolved by the provisioning engine.
//!
//! A [`Token`] stands in for a value that only exists once the producing
//! resource has been provisioned (a bucket's generated name, a service's
//! assigned URL). Tokens are rendered to CloudFormation intrinsic functions
//! and are never resolved locally.
//!
//! # Rendering
//!
//! ```text
//! Ref("Bucket")                 → {"Ref": "Bucket"}
//! GetAtt("Service", "Url")      → {"Fn::GetAtt": ["Service", "Url"]}
//! Join(["https://", GetAtt..])  → {"Fn::Join": ["", ["https://", {...}]]}
//! ```

use std::collections::BTreeSet;
use std::fmt;

use serde::{Serialize, Serializer};
use serde_json::{json, Value};

/// Pseudo parameters supplied by the engine for every stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pseudo {
    Region,
    Partition,
}

impl Pseudo {
    /// The `AWS::` name used in a `Ref`.
    pub fn name(self) -> &'static str {
        match self {
            Pseudo::Region => "AWS::Region",
            Pseudo::Partition => "AWS::Partition",
        }
    }
}

/// A possibly late-bound string value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A value known at synth time.
    Literal(String),
    /// The primary identifier of a declared resource or parameter.
    Ref(String),
    /// A named attribute of a declared resource.
    GetAtt { logical_id: String, attribute: String },
    /// An engine-supplied pseudo parameter.
    Pseudo(Pseudo),
    /// Concatenation of parts with an empty delimiter.
    Join(Vec<Token>),
}

impl Token {
    pub fn literal(value: impl Into<String>) -> Self {
        Token::Literal(value.into())
    }

    pub fn reference(logical_id: impl Into<String>) -> Self {
        Token::Ref(logical_id.into())
    }

    pub fn get_att(logical_id: impl Into<String>, attribute: impl Into<String>) -> Self {
        Token::GetAtt {
            logical_id: logical_id.into(),
            attribute: attribute.into(),
        }
    }

    /// Concatenate `parts`, flattening nested joins and merging adjacent
    /// literals. A join made only of literals collapses to a literal.
    pub fn join<I>(parts: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Token>,
    {
        let mut flat: Vec<Token> = Vec::new();
        for part in parts {
            match part.into() {
                Token::Join(inner) => {
                    for t in inner {
                        push_merged(&mut flat, t);
                    }
                }
                other => push_merged(&mut flat, other),
            }
        }
        flat.retain(|t| !matches!(t, Token::Literal(s) if s.is_empty()));
        match flat.len() {
            0 => Token::Literal(String::new()),
            1 => flat.remove(0),
            _ => Token::Join(flat),
        }
    }

    /// Returns the value if it is known at synth time.
    pub fn as_literal(&self) -> Option<&str> {
        match self {
            Token::Literal(s) => Some(s),
            _ => None,
        }
    }

    /// Returns `true` if the value can only be known after provisioning.
    pub fn is_deferred(&self) -> bool {
        !matches!(self, Token::Literal(_))
    }

    /// Logical ids this token depends on. Pseudo parameters are excluded.
    pub fn references(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect(&mut out);
        out
    }

    fn collect(&self, out: &mut BTreeSet<String>) {
        match self {
            Token::Ref(id) => {
                out.insert(id.clone());
            }
            Token::GetAtt { logical_id, .. } => {
                out.insert(logical_id.clone());
            }
            Token::Join(parts) => parts.iter().for_each(|p| p.collect(out)),
            Token::Literal(_) | Token::Pseudo(_) => {}
        }
    }

    /// Render as a CloudFormation value.
    pub fn to_json(&self) -> Value {
        match self {
            Token::Literal(s) => Value::String(s.clone()),
            Token::Ref(id) => json!({ "Ref": id }),
            Token::GetAtt {
                logical_id,
                attribute,
            } => json!({ "Fn::GetAtt": [logical_id, attribute] }),
            Token::Pseudo(p) => json!({ "Ref": p.name() }),
            Token::Join(parts) => {
                let rendered: Vec<Value> = parts.iter().map(Token::to_json).collect();
                json!({ "Fn::Join": ["", rendered] })
            }
        }
    }
}

fn push_merged(flat: &mut Vec<Token>, next: Token) {
    if let (Some(Token::Literal(prev)), Token::Literal(s)) = (flat.last_mut(), &next) {
        prev.push_str(s);
        return;
    }
    flat.push(next);
}

impl From<&str> for Token {
    fn from(s: &str) -> Self {
        Token::Literal(s.to_owned())
    }
}

impl From<String> for Token {
    fn from(s: String) -> Self {
        Token::Literal(s)
    }
}

impl From<Pseudo> for Token {
    fn from(p: Pseudo) -> Self {
        Token::Pseudo(p)
    }
}

impl From<&Token> for Token {
    fn from(t: &Token) -> Self {
        t.clone()
    }
}

impl Serialize for Token {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Literal(s) => f.write_str(s),
            Token::Ref(id) => write!(f, "${{{id}}}"),
            Token::GetAtt {
                logical_id,
                attribute,
            } => write!(f, "${{{logical_id}.{attribute}}}"),
            Token::Pseudo(p) => write!(f, "${{{}}}", p.name()),
            Token::Join(parts) => parts.iter().try_for_each(|p| write!(f, "{p}")),
        }
    }
}

/// Collect every logical id referenced by `Ref` or `Fn::GetAtt` anywhere in
/// a rendered CloudFormation value. `AWS::` pseudo parameters are skipped.
pub fn collect_references(value: &Value, out: &mut BTreeSet<String>) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(id)) = map.get("Ref") {
                if !id.starts_with("AWS::") {
                    out.insert(id.clone());
                }
            }
            if let Some(Value::Array(args)) = map.get("Fn::GetAtt") {
                if let Some(Value::String(id)) = args.first() {
                    out.insert(id.clone());
                }
            }
            map.values().for_each(|v| collect_references(v, out));
        }
        Value::Array(items) => items.iter().for_each(|v| collect_references(v, out)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_of_literals_collapses() {
        let t = Token::join(["https://", "example.com", "/v1/traces"]);
        assert_eq!(t, Token::literal("https://example.com/v1/traces"));
        assert!(!t.is_deferred());
    }

    #[test]
    fn join_flattens_and_merges() {
        let url = Token::get_att("Service", "ServiceUrl");
        let inner = Token::join([Token::literal("https://"), url.clone()]);
        let t = Token::join([inner, Token::literal("/v1"), Token::literal("/traces")]);
        assert_eq!(
            t,
            Token::Join(vec![
                Token::literal("https://"),
                url,
                Token::literal("/v1/traces"),
            ])
        );
    }

    #[test]
    fn join_drops_empty_literals() {
        let t = Token::join([Token::literal(""), Token::reference("Bucket"), Token::literal("")]);
        assert_eq!(t, Token::reference("Bucket"));
    }

    #[test]
    fn renders_intrinsics() {
        assert_eq!(Token::reference("Bucket").to_json(), json!({"Ref": "Bucket"}));
        assert_eq!(
            Token::get_att("Service", "ServiceUrl").to_json(),
            json!({"Fn::GetAtt": ["Service", "ServiceUrl"]})
        );
        assert_eq!(
            Token::Pseudo(Pseudo::Region).to_json(),
            json!({"Ref": "AWS::Region"})
        );
        let joined = Token::join([Token::literal("a"), Token::reference("B")]);
        assert_eq!(
            joined.to_json(),
            json!({"Fn::Join": ["", ["a", {"Ref": "B"}]]})
        );
    }

    #[test]
    fn references_skip_pseudo() {
        let t = Token::join([
            Token::reference("Bucket"),
            Token::Pseudo(Pseudo::Region),
            Token::get_att("Role", "Arn"),
        ]);
        let refs: Vec<String> = t.references().into_iter().collect();
        assert_eq!(refs, vec!["Bucket".to_string(), "Role".to_string()]);
    }

    #[test]
    fn collect_references_walks_nested_values() {
        let v = json!({
            "A": {"Ref": "Bucket"},
            "B": [{"Fn::Join": ["", [{"Fn::GetAtt": ["Role", "Arn"]}, {"Ref": "AWS::Region"}]]}],
        });
        let mut out = BTreeSet::new();
        collect_references(&v, &mut out);
        assert_eq!(out.len(), 2);
        assert!(out.contains("Bucket"));
        assert!(out.contains("Role"));
    }

    #[test]
    fn display_marks_deferred_parts() {
        let t = Token::join([Token::literal("https://"), Token::get_att("Svc", "ServiceUrl")]);
        assert_eq!(t.to_string(), "https://${Svc.ServiceUrl}");
    }
}
