use crate::graph::Graph;
use crate::node::NodeId;
use crate::variable::{VarId, VarKind};
use std::collections::BTreeSet;

/// Walks the node graph under `root` depth-first, invoking `functor` for
/// every node in its reachable closure exactly once, parent before its
/// not-yet-visited producers. The visited set is supplied by the caller
/// so that repeated traversals after partial graph extension do not redo
/// work. Sibling inputs are explored in the order the node lists them.
/// The graph is assumed acyclic; cycles are caught later, at network
/// build time.
pub fn traverse(
    graph: &Graph,
    root: NodeId,
    visited: &mut BTreeSet<NodeId>,
    functor: &mut impl FnMut(NodeId),
) {
    if !visited.insert(root) {
        return;
    }
    functor(root);
    // Explicit stack of (node, next input index) pairs reproduces the
    // recursive pre-order without growing the call stack on deep graphs.
    let mut stack = vec![(root, 0usize)];
    while let Some((nid, idx)) = stack.pop() {
        let prim = graph.prim(nid);
        if idx < prim.inputs.len() {
            stack.push((nid, idx + 1));
            if let VarKind::Output { owner, .. } = graph.var(prim.inputs[idx]).kind {
                if visited.insert(owner) {
                    functor(owner);
                    stack.push((owner, 0));
                }
            }
        }
    }
}

/// Get the full reachable closure of `root`.
#[must_use]
pub fn collect(graph: &Graph, root: NodeId) -> BTreeSet<NodeId> {
    let mut visited = BTreeSet::new();
    traverse(graph, root, &mut visited, &mut |_| {});
    visited
}

/// Determine the free inputs of the graph under `root`: every input
/// variable of a visited node that is not produced by a node, each
/// exactly once, in first-discovery order.
#[must_use]
pub fn determine_inputs(
    graph: &Graph,
    root: NodeId,
    visited: &mut BTreeSet<NodeId>,
) -> Vec<VarId> {
    let mut inputs = Vec::new();
    let mut unique_inputs = BTreeSet::new();
    traverse(graph, root, visited, &mut |nid| {
        for &input in &graph.prim(nid).inputs {
            if !graph.var(input).is_output() && unique_inputs.insert(input) {
                inputs.push(input);
            }
        }
    });
    inputs
}
