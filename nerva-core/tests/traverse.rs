use nerva_core::dtype::DType;
use nerva_core::error::NervaError;
use nerva_core::graph::Graph;
use nerva_core::node::{NodeId, Op};
use nerva_core::traverse::{collect, determine_inputs, traverse};
use nerva_core::variable::VarId;
use std::collections::BTreeSet;

fn owner(g: &Graph, x: VarId) -> NodeId {
    g.var(x).owner().unwrap()
}

#[test]
fn closure_visits_each_node_exactly_once() -> Result<(), NervaError> {
    // Diamond: both a and b feed c, x is shared underneath.
    let mut g = Graph::new();
    let x = g.input([2], DType::F32, "x");
    let a = g.apply(Op::Relu, &[x], "a")?;
    let b = g.apply(Op::Exp, &[x], "b")?;
    let c = g.apply(Op::Add, &[a, b], "c")?;

    let mut order = Vec::new();
    let mut visited = BTreeSet::new();
    traverse(&g, owner(&g, c), &mut visited, &mut |nid| order.push(nid));

    assert_eq!(order.len(), 3);
    assert_eq!(order[0], owner(&g, c));
    let unique: BTreeSet<NodeId> = order.iter().copied().collect();
    assert_eq!(unique.len(), order.len());
    assert_eq!(visited, unique);
    Ok(())
}

#[test]
fn collect_returns_reachable_closure_only() -> Result<(), NervaError> {
    let mut g = Graph::new();
    let x = g.input([2], DType::F32, "x");
    let a = g.apply(Op::Relu, &[x], "a")?;
    // Unrelated node, not reachable from a's owner.
    let y = g.input([2], DType::F32, "y");
    let b = g.apply(Op::Exp, &[y], "b")?;

    let closure = collect(&g, owner(&g, a));
    assert!(closure.contains(&owner(&g, a)));
    assert!(!closure.contains(&owner(&g, b)));
    assert_eq!(closure.len(), 1);
    Ok(())
}

#[test]
fn inputs_in_first_discovery_order_and_unique() -> Result<(), NervaError> {
    let mut g = Graph::new();
    let x = g.input([3], DType::F32, "x");
    let y = g.input([3], DType::F32, "y");
    let z = g.apply(Op::Add, &[x, y], "z")?;
    let w = g.apply(Op::Mul, &[z, x], "w")?;

    let mut visited = BTreeSet::new();
    let inputs = determine_inputs(&g, owner(&g, w), &mut visited);
    // x is discovered at the root node before the traversal descends
    // into z's producer, and is listed only once.
    assert_eq!(inputs, vec![x, y]);
    Ok(())
}

#[test]
fn external_visited_set_skips_already_seen_subgraphs() -> Result<(), NervaError> {
    let mut g = Graph::new();
    let x = g.input([3], DType::F32, "x");
    let a = g.apply(Op::Relu, &[x], "a")?;
    let b = g.apply(Op::Exp, &[a], "b")?;

    let mut visited = BTreeSet::new();
    let first = determine_inputs(&g, owner(&g, a), &mut visited);
    assert_eq!(first, vec![x]);
    // a's owner is already in the visited set, so only b's node is
    // walked and x is not reported again.
    let second = determine_inputs(&g, owner(&g, b), &mut visited);
    assert_eq!(second, Vec::<VarId>::new());
    Ok(())
}

#[test]
fn parameters_and_constants_are_free_inputs() -> Result<(), NervaError> {
    use nerva_core::value::Value;
    let mut g = Graph::new();
    let x = g.input([2], DType::F32, "x");
    let w = g.parameter(Value::from_slice([2], &[1.0f32, 2.0])?, "w");
    let c = g.constant(Value::from_slice([2], &[5.0f32, 5.0])?, "c");
    let t = g.apply(Op::Mul, &[x, w], "t")?;
    let out = g.apply(Op::Add, &[t, c], "out")?;

    let mut visited = BTreeSet::new();
    let inputs = determine_inputs(&g, owner(&g, out), &mut visited);
    assert_eq!(inputs, vec![c, x, w]);
    Ok(())
}
