//! Stack declaration: logical ids, parameters, resources, outputs, and the
//! dependency graph derived from them.
//!
//! # Module invariants
//!
//! - Each logical id is declared exactly once across parameters and resources.
//! - This module declares; it never resolves a [`Token`](common::Token).
//!   Ordering is left to the engine, which derives the same graph as
//!   [`DependencyGraph`].

pub mod dag;

pub use dag::DependencyGraph;

use std::collections::{BTreeMap, BTreeSet};

use common::template::{Output, Parameter, ResourceDecl, Template};
use common::{StackError, Token};
use tracing::debug;

/// A stack under construction.
#[derive(Debug, Clone)]
pub struct Stack {
    name: String,
    region: String,
    account: Option<String>,
    description: Option<String>,
    parameters: BTreeMap<String, Parameter>,
    resources: BTreeMap<String, ResourceDecl>,
    outputs: BTreeMap<String, Output>,
}

impl Stack {
    pub fn new(
        name: impl Into<String>,
        region: impl Into<String>,
        account: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            region: region.into(),
            account,
            description: None,
            parameters: BTreeMap::new(),
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn account(&self) -> Option<&str> {
        self.account.as_deref()
    }

    /// Declare a deploy-time parameter and return a reference to it.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::DuplicateLogicalId`] if `id` is taken.
    pub fn add_parameter(&mut self, id: &str, parameter: Parameter) -> Result<Token, StackError> {
        self.claim(id)?;
        self.parameters.insert(id.to_owned(), parameter);
        Ok(Token::reference(id))
    }

    /// Declare a resource.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::DuplicateLogicalId`] if `id` is taken.
    pub fn add_resource(&mut self, id: &str, decl: ResourceDecl) -> Result<(), StackError> {
        self.claim(id)?;
        debug!(logical_id = id, kind = %decl.kind, "declared resource");
        self.resources.insert(id.to_owned(), decl);
        Ok(())
    }

    /// Add an explicit ordering edge: `dependent` starts after `prerequisite`.
    ///
    /// Only needed where no data reference already implies the order.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::DanglingReference`] if either id is undeclared.
    pub fn add_dependency(
        &mut self,
        dependent: &str,
        prerequisite: &str,
    ) -> Result<(), StackError> {
        if !self.resources.contains_key(prerequisite) {
            return Err(StackError::DanglingReference {
                from: dependent.to_owned(),
                target: prerequisite.to_owned(),
            });
        }
        let decl = self
            .resources
            .get_mut(dependent)
            .ok_or_else(|| StackError::DanglingReference {
                from: prerequisite.to_owned(),
                target: dependent.to_owned(),
            })?;
        decl.depends_on.insert(prerequisite.to_owned());
        Ok(())
    }

    /// Declare a stack output.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::DuplicateLogicalId`] if an output named `id`
    /// already exists.
    pub fn add_output(
        &mut self,
        id: &str,
        value: Token,
        description: Option<&str>,
    ) -> Result<(), StackError> {
        if self.outputs.contains_key(id) {
            return Err(StackError::DuplicateLogicalId(id.to_owned()));
        }
        self.outputs.insert(
            id.to_owned(),
            Output {
                value,
                description: description.map(str::to_owned),
            },
        );
        Ok(())
    }

    pub fn resource(&self, id: &str) -> Option<&ResourceDecl> {
        self.resources.get(id)
    }

    pub(crate) fn resource_mut(&mut self, id: &str) -> Option<&mut ResourceDecl> {
        self.resources.get_mut(id)
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    /// Validate references and derive the dependency graph.
    ///
    /// # Errors
    ///
    /// See [`DependencyGraph::build`].
    pub fn graph(&self) -> Result<DependencyGraph, StackError> {
        let params: BTreeSet<String> = self.parameters.keys().cloned().collect();
        DependencyGraph::build(&self.resources, &params)
    }

    /// Validate the stack and render the template.
    ///
    /// # Errors
    ///
    /// Fails if the graph is invalid or an output references an undeclared id.
    pub fn synthesize(&self) -> Result<Template, StackError> {
        let graph = self.graph()?;

        for (id, output) in &self.outputs {
            for target in output.value.references() {
                if !self.resources.contains_key(&target) && !self.parameters.contains_key(&target) {
                    return Err(StackError::DanglingReference {
                        from: id.clone(),
                        target,
                    });
                }
            }
        }

        let mut template = Template::new(self.description.clone());
        template.parameters = self.parameters.clone();
        template.resources = self.resources.clone();
        template.outputs = self.outputs.clone();

        debug!(
            stack = %self.name,
            resources = graph.len(),
            order = ?graph.provisioning_order(),
            "stack synthesized"
        );
        Ok(template)
    }

    fn claim(&self, id: &str) -> Result<(), StackError> {
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(StackError::InvalidLogicalId(id.to_owned()));
        }
        if self.resources.contains_key(id) || self.parameters.contains_key(id) {
            return Err(StackError::DuplicateLogicalId(id.to_owned()));
        }
        Ok(())
    }
}
