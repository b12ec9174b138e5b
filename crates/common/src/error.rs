//! Common error types shared across crates.

use thiserror::Error;

/// Top-level stack composition error type.
///
/// Every variant is a synth-time failure: nothing has been handed to the
/// provisioning engine when one of these is returned.
#[derive(Debug, Error)]
pub enum StackError {
    /// A required external input (environment value) was absent or empty.
    #[error("missing required input: {}", .0.join(", "))]
    MissingInput(Vec<String>),

    /// A grant was requested with a wildcard action or resource scope.
    #[error("grant too broad: {0}")]
    GrantTooBroad(String),

    /// A token references a logical id that was never declared in the stack.
    #[error("resource {from} references undeclared resource {target}")]
    DanglingReference { from: String, target: String },

    /// A logical id is empty or contains characters other than ASCII letters and digits.
    #[error("invalid logical id: {0:?}")]
    InvalidLogicalId(String),

    /// A declared resource's properties do not have the shape its construct
    /// writes, so they cannot be amended.
    #[error("malformed declaration of {id}: {detail}")]
    MalformedDeclaration { id: String, detail: String },

    /// Two constructs were declared under the same logical id.
    #[error("logical id already declared: {0}")]
    DuplicateLogicalId(String),

    /// The declared dependencies form a cycle.
    #[error("dependency cycle through {0}")]
    DependencyCycle(String),

    /// An instrumentation environment contract lacks a required variable.
    #[error("instrumentation environment is missing {0}")]
    IncompleteContract(String),

    /// The collector configuration artifact failed validation.
    #[error("invalid config artifact: {0}")]
    InvalidArtifact(String),
}

impl StackError {
    /// Returns a short machine-readable code for this error.
    pub fn kind(&self) -> &'static str {
        match self {
            StackError::MissingInput(_) => "missing_input",
            StackError::GrantTooBroad(_) => "policy_too_broad",
            StackError::DanglingReference { .. } => "late_bound_reference",
            StackError::InvalidLogicalId(_) => "invalid_logical_id",
            StackError::MalformedDeclaration { .. } => "malformed_declaration",
            StackError::DuplicateLogicalId(_) => "duplicate_declaration",
            StackError::DependencyCycle(_) => "dependency_cycle",
            StackError::IncompleteContract(_) => "incomplete_contract",
            StackError::InvalidArtifact(_) => "invalid_artifact",
        }
    }
}
