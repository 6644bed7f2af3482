use nerva_core::composite::Composite;
use nerva_core::dtype::DType;
use nerva_core::error::NervaError;
use nerva_core::graph::Graph;
use nerva_core::node::{node_id, NodeId, Op};
use nerva_core::variable::VarId;
use std::collections::BTreeMap;

fn owner(c: &Composite, x: VarId) -> NodeId {
    c.graph().var(x).owner().unwrap()
}

fn relu_over_placeholder() -> Result<(Composite, VarId), NervaError> {
    let mut g = Graph::new();
    let p = g.placeholder([2], DType::F32, "p");
    let out = g.apply(Op::Relu, &[p], "out")?;
    let root = g.var(out).owner().unwrap();
    Ok((Composite::new(g, root)?, p))
}

#[test]
fn outputs_are_the_root_outputs() -> Result<(), NervaError> {
    let mut g = Graph::new();
    let x = g.input([2], DType::F32, "x");
    let a = g.apply(Op::Relu, &[x], "a")?;
    let b = g.apply(Op::Exp, &[a], "b")?;
    let root = g.var(b).owner().unwrap();
    let composite = Composite::new(g, root)?;
    assert_eq!(composite.outputs(), [b].as_slice());
    assert_eq!(composite.owned().len(), 2);
    Ok(())
}

#[test]
fn replacement_grafts_subgraph_into_owned_set() -> Result<(), NervaError> {
    let (mut composite, p) = relu_over_placeholder()?;
    assert_eq!(composite.unresolved_placeholders(), vec![p]);
    assert_eq!(composite.owned().len(), 1);

    // Build the replacement subgraph in the same arena, then graft it.
    let g = composite.graph_mut();
    let x = g.input([2], DType::F32, "x");
    let y = g.input([2], DType::F32, "y");
    let sum = g.apply(Op::Add, &[x, y], "sum")?;
    let substitutions: BTreeMap<VarId, VarId> = [(p, sum)].into();
    composite.replace_placeholders(&substitutions)?;

    assert!(composite.owned().contains(&owner(&composite, sum)));
    assert_eq!(composite.owned().len(), 2);
    assert!(composite.unresolved_placeholders().is_empty());
    assert_eq!(composite.inputs(), [x, y].as_slice());
    Ok(())
}

#[test]
fn replacing_a_non_placeholder_is_rejected() -> Result<(), NervaError> {
    let mut g = Graph::new();
    let x = g.input([2], DType::F32, "x");
    let y = g.input([2], DType::F32, "y");
    let out = g.apply(Op::Add, &[x, y], "out")?;
    let root = g.var(out).owner().unwrap();
    let mut composite = Composite::new(g, root)?;

    let substitutions: BTreeMap<VarId, VarId> = [(x, y)].into();
    assert!(matches!(
        composite.replace_placeholders(&substitutions),
        Err(NervaError::NotAPlaceholder(v)) if v == x
    ));
    Ok(())
}

#[test]
fn replacement_shape_and_dtype_must_match() -> Result<(), NervaError> {
    let (mut composite, p) = relu_over_placeholder()?;
    let wrong_shape = composite.graph_mut().input([3], DType::F32, "x");
    let substitutions: BTreeMap<VarId, VarId> = [(p, wrong_shape)].into();
    assert!(matches!(
        composite.replace_placeholders(&substitutions),
        Err(NervaError::ShapeMismatch { .. })
    ));

    let wrong_dtype = composite.graph_mut().input([2], DType::F64, "x");
    let substitutions: BTreeMap<VarId, VarId> = [(p, wrong_dtype)].into();
    assert!(matches!(
        composite.replace_placeholders(&substitutions),
        Err(NervaError::InvalidDType { .. })
    ));
    Ok(())
}

#[test]
fn failed_replacement_leaves_graph_untouched() -> Result<(), NervaError> {
    let (mut composite, p) = relu_over_placeholder()?;
    let wrong = composite.graph_mut().input([3], DType::F32, "x");
    let substitutions: BTreeMap<VarId, VarId> = [(p, wrong)].into();
    assert!(composite.replace_placeholders(&substitutions).is_err());
    // The placeholder is still free and unresolved.
    assert_eq!(composite.unresolved_placeholders(), vec![p]);
    Ok(())
}

#[test]
fn argument_dependencies_are_per_output() -> Result<(), NervaError> {
    let mut g = Graph::new();
    let x = g.input([2], DType::F32, "x");
    let y = g.input([2], DType::F32, "y");
    let a = g.apply(Op::Relu, &[x], "a")?;
    let b = g.apply(Op::Add, &[a, y], "b")?;
    let root = g.var(b).owner().unwrap();
    let mut composite = Composite::new(g, root)?;

    assert_eq!(composite.argument_dependencies(b)?, [y, x].as_slice());
    assert_eq!(composite.argument_dependencies(a)?, [x].as_slice());
    Ok(())
}

#[test]
fn argument_dependencies_of_unowned_output_is_an_error() -> Result<(), NervaError> {
    let mut g = Graph::new();
    let x = g.input([2], DType::F32, "x");
    let a = g.apply(Op::Relu, &[x], "a")?;
    let y = g.input([2], DType::F32, "y");
    let other = g.apply(Op::Exp, &[y], "other")?;
    let root = g.var(a).owner().unwrap();
    let mut composite = Composite::new(g, root)?;

    assert!(matches!(
        composite.argument_dependencies(other),
        Err(NervaError::UnreachableOutput(v)) if v == other
    ));
    assert!(matches!(
        composite.argument_dependencies(x),
        Err(NervaError::UnreachableOutput(v)) if v == x
    ));
    Ok(())
}

#[test]
fn out_of_range_root_is_an_unknown_node() {
    let g = Graph::new();
    assert!(matches!(
        Composite::new(g, node_id(0)),
        Err(NervaError::UnknownNode(_))
    ));
}
