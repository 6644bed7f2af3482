//! Structural invariants checked over randomly generated graphs.

use nerva_core::composite::Composite;
use nerva_core::dtype::DType;
use nerva_core::graph::Graph;
use nerva_core::io::{deserialize, serialize};
use nerva_core::network::NetworkPlan;
use nerva_core::node::{NodeId, Op};
use nerva_core::traverse::{collect, determine_inputs};
use nerva_core::variable::{VarId, VarKind};
use proptest::collection::vec;
use proptest::prelude::*;
use std::collections::BTreeSet;

// Each step appends one node whose inputs are drawn from the variables
// created so far, so any generated graph is acyclic by construction.
fn build_graph(steps: &[(u8, usize, usize)]) -> (Graph, VarId) {
    let mut g = Graph::new();
    let mut vars = vec![
        g.input([2], DType::F32, "x"),
        g.input([2], DType::F32, "y"),
    ];
    let mut last = vars[0];
    for (n, &(opsel, i, j)) in steps.iter().enumerate() {
        let a = vars[i % vars.len()];
        let b = vars[j % vars.len()];
        let out = match opsel % 5 {
            0 => g.apply(Op::Add, &[a, b], format!("t{n}")),
            1 => g.apply(Op::Sub, &[a, b], format!("t{n}")),
            2 => g.apply(Op::Mul, &[a, b], format!("t{n}")),
            3 => g.apply(Op::Relu, &[a], format!("t{n}")),
            _ => g.apply(Op::Neg, &[a], format!("t{n}")),
        }
        .unwrap();
        vars.push(out);
        last = out;
    }
    (g, last)
}

fn brute_force_reachable(g: &Graph, root: NodeId) -> BTreeSet<NodeId> {
    let mut reachable = BTreeSet::new();
    let mut frontier = vec![root];
    while let Some(nid) = frontier.pop() {
        if !reachable.insert(nid) {
            continue;
        }
        for &input in &g.prim(nid).inputs {
            if let VarKind::Output { owner, .. } = g.var(input).kind {
                frontier.push(owner);
            }
        }
    }
    reachable
}

proptest! {
    /// The traversal closure equals plain reachability.
    #[test]
    fn closure_equals_reachability(steps in vec((any::<u8>(), any::<usize>(), any::<usize>()), 1..40)) {
        let (g, last) = build_graph(&steps);
        let root = g.var(last).owner().unwrap();
        prop_assert_eq!(collect(&g, root), brute_force_reachable(&g, root));
    }

    /// Free inputs are unique and never produced by a node.
    #[test]
    fn free_inputs_are_unique_non_outputs(steps in vec((any::<u8>(), any::<usize>(), any::<usize>()), 1..40)) {
        let (g, last) = build_graph(&steps);
        let root = g.var(last).owner().unwrap();
        let mut visited = BTreeSet::new();
        let inputs = determine_inputs(&g, root, &mut visited);
        let unique: BTreeSet<VarId> = inputs.iter().copied().collect();
        prop_assert_eq!(unique.len(), inputs.len());
        for &x in &inputs {
            prop_assert!(!g.var(x).is_output());
        }
    }

    /// Plans are topologically ordered and memoize shared variables.
    #[test]
    fn plans_are_topological(steps in vec((any::<u8>(), any::<usize>(), any::<usize>()), 1..40)) {
        let (g, last) = build_graph(&steps);
        let root = g.var(last).owner().unwrap();
        let composite = Composite::new(g, root).unwrap();
        let outputs: BTreeSet<VarId> = [last].into();
        let plan = NetworkPlan::build(&composite, &BTreeSet::new(), &outputs).unwrap();
        for (i, node) in plan.nodes.iter().enumerate() {
            for input in &node.inputs {
                prop_assert!(input.i() < i);
            }
        }
        let vars: BTreeSet<VarId> = plan.nodes.iter().map(|n| n.var).collect();
        prop_assert_eq!(vars.len(), plan.nodes.len());
        prop_assert!(plan.var_to_node.contains_key(&last));
    }

    /// Serialization is canonical over arbitrary graphs.
    #[test]
    fn serialization_round_trips(steps in vec((any::<u8>(), any::<usize>(), any::<usize>()), 1..30)) {
        let (g, last) = build_graph(&steps);
        let root = g.var(last).owner().unwrap();
        let composite = Composite::new(g, root).unwrap();
        let dict = serialize(&composite);
        let restored = deserialize(&dict).unwrap();
        prop_assert_eq!(serialize(&restored), dict);
    }
}
