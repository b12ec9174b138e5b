//! [`DependencyGraph`]: the provisioning order the engine will derive.
//!
//! Edges point from prerequisite to dependent. An edge exists for every
//! explicit `DependsOn` entry and every `Ref` / `Fn::GetAtt` found in a
//! resource's properties, which is exactly how the engine orders work.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use common::template::ResourceDecl;
use common::StackError;
use petgraph::algo::{has_path_connecting, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

/// Validated, acyclic resource dependency graph.
#[derive(Debug)]
pub struct DependencyGraph {
    inner: DiGraph<String, ()>,
    index: HashMap<String, NodeIndex>,
    order: Vec<String>,
    retained: BTreeSet<String>,
}

impl DependencyGraph {
    /// Build the graph for `resources`.
    ///
    /// References to `parameters` are legal but add no edge: parameters are
    /// supplied before any resource is created.
    ///
    /// # Errors
    ///
    /// - [`StackError::DanglingReference`] if a resource references an id that
    ///   is neither a declared resource nor a parameter.
    /// - [`StackError::DependencyCycle`] if the edges form a cycle, including a
    ///   resource referencing itself.
    pub fn build(
        resources: &BTreeMap<String, ResourceDecl>,
        parameters: &BTreeSet<String>,
    ) -> Result<Self, StackError> {
        let mut inner = DiGraph::new();
        let mut index = HashMap::new();

        for id in resources.keys() {
            index.insert(id.clone(), inner.add_node(id.clone()));
        }

        for (id, decl) in resources {
            let to = index[id];
            for target in decl.dependencies() {
                if target == *id {
                    return Err(StackError::DependencyCycle(id.clone()));
                }
                match index.get(&target) {
                    Some(&from) => {
                        inner.update_edge(from, to, ());
                    }
                    None if parameters.contains(&target) => {}
                    None => {
                        return Err(StackError::DanglingReference {
                            from: id.clone(),
                            target,
                        })
                    }
                }
            }
        }

        let order = toposort(&inner, None)
            .map_err(|cycle| StackError::DependencyCycle(inner[cycle.node_id()].clone()))?
            .into_iter()
            .map(|n| inner[n].clone())
            .collect();

        let retained = resources
            .iter()
            .filter(|(_, decl)| !decl.is_deleted_on_teardown())
            .map(|(id, _)| id.clone())
            .collect();

        Ok(Self {
            inner,
            index,
            order,
            retained,
        })
    }

    /// Number of resources in the graph.
    pub fn len(&self) -> usize {
        self.inner.node_count()
    }

    /// Returns `true` if the graph has no resources.
    pub fn is_empty(&self) -> bool {
        self.inner.node_count() == 0
    }

    /// Order in which the engine can create resources.
    pub fn provisioning_order(&self) -> &[String] {
        &self.order
    }

    /// Order in which the engine deletes resources: the reverse of
    /// [`provisioning_order`](Self::provisioning_order), skipping
    /// [`retained`](Self::retained) ones.
    pub fn teardown_order(&self) -> impl Iterator<Item = &str> {
        self.order
            .iter()
            .rev()
            .filter(|id| !self.retained.contains(*id))
            .map(String::as_str)
    }

    /// Resources left behind when the stack is deleted.
    pub fn retained(&self) -> &BTreeSet<String> {
        &self.retained
    }

    /// Direct prerequisites of `id`.
    pub fn prerequisites(&self, id: &str) -> BTreeSet<&str> {
        self.neighbours(id, Direction::Incoming)
    }

    /// Resources that directly wait on `id`.
    pub fn dependents(&self, id: &str) -> BTreeSet<&str> {
        self.neighbours(id, Direction::Outgoing)
    }

    /// Returns `true` if `dependent` cannot start before `prerequisite`
    /// exists, directly or through intermediate resources.
    pub fn depends_on(&self, dependent: &str, prerequisite: &str) -> bool {
        match (self.index.get(prerequisite), self.index.get(dependent)) {
            (Some(&from), Some(&to)) if from != to => {
                has_path_connecting(&self.inner, from, to, None)
            }
            _ => false,
        }
    }

    /// Returns `true` if neither resource waits on the other, so the engine
    /// is free to provision them concurrently.
    pub fn independent(&self, a: &str, b: &str) -> bool {
        !self.depends_on(a, b) && !self.depends_on(b, a)
    }

    fn neighbours(&self, id: &str, dir: Direction) -> BTreeSet<&str> {
        match self.index.get(id) {
            Some(&n) => self
                .inner
                .neighbors_directed(n, dir)
                .map(|m| self.inner[m].as_str())
                .collect(),
            None => BTreeSet::new(),
        }
    }
}
