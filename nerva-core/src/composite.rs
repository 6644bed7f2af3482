use crate::error::NervaError;
use crate::graph::Graph;
use crate::node::NodeId;
use crate::traverse::{collect, determine_inputs};
use crate::variable::{VarId, VarKind};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// The owned closure of primitive nodes reachable from a root node,
/// treated as one callable unit. Owns the arena; the owned set is always
/// exactly the reachable closure of the root, also after placeholder
/// replacement grafts new subgraphs in.
#[derive(Clone, Debug)]
pub struct Composite {
    graph: Graph,
    root: NodeId,
    owned: BTreeSet<NodeId>,
    // Free input list, lazily derived from the owned set.
    inputs: Option<Vec<VarId>>,
    // Free inputs each output actually depends on, cached per output.
    arg_deps: BTreeMap<VarId, Vec<VarId>>,
}

impl Composite {
    /// Create a composite graph owning the reachable closure of `root`.
    pub fn new(graph: Graph, root: NodeId) -> Result<Self, NervaError> {
        if root.i() >= graph.num_prims() {
            return Err(NervaError::UnknownNode(root));
        }
        let owned = collect(&graph, root);
        Ok(Self {
            graph,
            root,
            owned,
            inputs: None,
            arg_deps: BTreeMap::new(),
        })
    }

    /// Get the root node.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Get the externally visible outputs: the root node's outputs.
    #[must_use]
    pub fn outputs(&self) -> &[VarId] {
        &self.graph.prim(self.root).outputs
    }

    /// Get the underlying arena.
    #[must_use]
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Get mutable access to the underlying arena, for mutating
    /// parameter values and for building replacement subgraphs. Nodes
    /// added here become owned only once they are grafted in through
    /// [Composite::replace_placeholders].
    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    /// Get the owned node set.
    #[must_use]
    pub fn owned(&self) -> &BTreeSet<NodeId> {
        &self.owned
    }

    /// Get the free inputs of this graph, in first-discovery order.
    /// Computed once and cached until the owned set changes.
    pub fn inputs(&mut self) -> &[VarId] {
        if self.inputs.is_none() {
            let mut visited = BTreeSet::new();
            self.inputs = Some(determine_inputs(&self.graph, self.root, &mut visited));
        }
        self.inputs.as_deref().unwrap_or(&[])
    }

    /// Get the placeholders still present in the free input list.
    pub fn unresolved_placeholders(&mut self) -> Vec<VarId> {
        let inputs: Vec<VarId> = self.inputs().to_vec();
        inputs
            .into_iter()
            .filter(|&x| self.graph.var(x).is_placeholder())
            .collect()
    }

    /// Get the free inputs the given output actually depends on.
    /// Cached per output until the owned set changes.
    pub fn argument_dependencies(&mut self, output: VarId) -> Result<&[VarId], NervaError> {
        if !self.graph.contains_var(output) {
            return Err(NervaError::UnknownVariable(output));
        }
        let Some(owner) = self.graph.var(output).owner() else {
            return Err(NervaError::UnreachableOutput(output));
        };
        if !self.owned.contains(&owner) {
            return Err(NervaError::UnreachableOutput(output));
        }
        if !self.arg_deps.contains_key(&output) {
            let mut visited = BTreeSet::new();
            let deps = determine_inputs(&self.graph, owner, &mut visited);
            self.arg_deps.insert(output, deps);
        }
        Ok(&self.arg_deps[&output])
    }

    /// Replace placeholders with the given substitutions. Every key must
    /// be a placeholder in the free input list; every replacement must
    /// match its shape and dtype. When a replacement is the output of a
    /// node, that node's reachable closure is grafted into the owned set
    /// so the graph stays self-consistent.
    pub fn replace_placeholders(
        &mut self,
        substitutions: &BTreeMap<VarId, VarId>,
    ) -> Result<(), NervaError> {
        let free: BTreeSet<VarId> = self.inputs().iter().copied().collect();
        for (&placeholder, &replacement) in substitutions {
            if !free.contains(&placeholder) || !self.graph.var(placeholder).is_placeholder() {
                return Err(NervaError::NotAPlaceholder(placeholder));
            }
            if !self.graph.contains_var(replacement) {
                return Err(NervaError::UnknownVariable(replacement));
            }
            let p = self.graph.var(placeholder);
            let r = self.graph.var(replacement);
            if r.shape != p.shape {
                return Err(NervaError::ShapeMismatch {
                    expected: p.shape.clone(),
                    found: r.shape.clone(),
                });
            }
            if r.dtype != p.dtype {
                return Err(NervaError::InvalidDType {
                    expected: p.dtype,
                    found: r.dtype,
                });
            }
        }
        let mut replaced = BTreeSet::new();
        for (&placeholder, &replacement) in substitutions {
            self.graph.rebind(placeholder, replacement);
            replaced.insert(placeholder);
        }
        self.on_placeholders_replaced(substitutions, &replaced);
        Ok(())
    }

    // Grafts the subgraphs under replacement outputs into the owned set
    // and drops the caches derived from the old structure.
    fn on_placeholders_replaced(
        &mut self,
        substitutions: &BTreeMap<VarId, VarId>,
        replaced: &BTreeSet<VarId>,
    ) {
        for placeholder in replaced {
            let replacement = substitutions[placeholder];
            if let VarKind::Output { owner, .. } = self.graph.var(replacement).kind {
                let grafted = collect(&self.graph, owner);
                debug!(
                    placeholder = %placeholder,
                    nodes = grafted.len(),
                    "grafting subgraph for replaced placeholder"
                );
                self.owned.extend(grafted);
            }
        }
        self.inputs = None;
        self.arg_deps.clear();
    }
}
