use nerva_core::composite::Composite;
use nerva_core::device::Device;
use nerva_core::dtype::DType;
use nerva_core::error::NervaError;
use nerva_core::graph::Graph;
use nerva_core::node::Op;
use nerva_core::value::Value;
use nerva_core::variable::VarId;
use nerva_cpu::Session;
use std::collections::{BTreeMap, BTreeSet};

fn assert_close(found: &[f32], expected: &[f32]) {
    assert_eq!(found.len(), expected.len());
    for (f, e) in found.iter().zip(expected.iter()) {
        assert!((f - e).abs() < 1e-5, "found {found:?}, expected {expected:?}");
    }
}

// Runs op over one input vector, returning the forward value and the
// gradient of the input under an all-ones output gradient.
fn run_unary(op: Op, x: &[f32]) -> Result<(Vec<f32>, Vec<f32>), NervaError> {
    let mut g = Graph::new();
    let xv = g.input([x.len()], DType::F32, "x");
    let out = g.apply(op, &[xv], "out")?;
    let root = g.var(out).owner().unwrap();
    let mut session = Session::new(Composite::new(g, root)?, nerva_cpu::executor());

    let arguments: BTreeMap<VarId, Value> =
        [(xv, Value::from_slice([x.len()], x)?)].into();
    let outputs: BTreeSet<VarId> = [out].into();
    let (results, state) = session.forward(&arguments, &outputs, Device::Cpu, &outputs)?;
    let forward = results[&out].as_f32().unwrap().to_vec();

    let ones = Value::from_slice(
        results[&out].shape().clone(),
        &vec![1.0f32; results[&out].numel()],
    )?;
    let grads = session.backward(
        state.unwrap(),
        &[(out, ones)].into(),
        &[xv].into(),
    )?;
    let grad = grads[&xv].as_f32().unwrap().to_vec();
    Ok((forward, grad))
}

fn run_binary(op: Op, x: &[f32], y: &[f32]) -> Result<(Vec<f32>, Vec<f32>, Vec<f32>), NervaError> {
    let mut g = Graph::new();
    let xv = g.input([x.len()], DType::F32, "x");
    let yv = g.input([y.len()], DType::F32, "y");
    let out = g.apply(op, &[xv, yv], "out")?;
    let root = g.var(out).owner().unwrap();
    let mut session = Session::new(Composite::new(g, root)?, nerva_cpu::executor());

    let arguments: BTreeMap<VarId, Value> = [
        (xv, Value::from_slice([x.len()], x)?),
        (yv, Value::from_slice([y.len()], y)?),
    ]
    .into();
    let outputs: BTreeSet<VarId> = [out].into();
    let (results, state) = session.forward(&arguments, &outputs, Device::Cpu, &outputs)?;
    let forward = results[&out].as_f32().unwrap().to_vec();

    let ones = Value::from_slice([x.len()], &vec![1.0f32; x.len()])?;
    let grads = session.backward(
        state.unwrap(),
        &[(out, ones)].into(),
        &[xv, yv].into(),
    )?;
    Ok((
        forward,
        grads[&xv].as_f32().unwrap().to_vec(),
        grads[&yv].as_f32().unwrap().to_vec(),
    ))
}

#[test]
fn add() -> Result<(), NervaError> {
    let (z, gx, gy) = run_binary(Op::Add, &[2., 4.], &[3., -1.])?;
    assert_close(&z, &[5., 3.]);
    assert_close(&gx, &[1., 1.]);
    assert_close(&gy, &[1., 1.]);
    Ok(())
}

#[test]
fn sub() -> Result<(), NervaError> {
    let (z, gx, gy) = run_binary(Op::Sub, &[2., 4.], &[3., -1.])?;
    assert_close(&z, &[-1., 5.]);
    assert_close(&gx, &[1., 1.]);
    assert_close(&gy, &[-1., -1.]);
    Ok(())
}

#[test]
fn mul() -> Result<(), NervaError> {
    let (z, gx, gy) = run_binary(Op::Mul, &[2., 4.], &[3., -1.])?;
    assert_close(&z, &[6., -4.]);
    assert_close(&gx, &[3., -1.]);
    assert_close(&gy, &[2., 4.]);
    Ok(())
}

#[test]
fn div() -> Result<(), NervaError> {
    let (z, gx, gy) = run_binary(Op::Div, &[6., 4.], &[3., 2.])?;
    assert_close(&z, &[2., 2.]);
    assert_close(&gx, &[1. / 3., 0.5]);
    assert_close(&gy, &[-2. / 3., -1.]);
    Ok(())
}

#[test]
fn pow() -> Result<(), NervaError> {
    let (z, gx, gy) = run_binary(Op::Pow, &[2., 3.], &[3., 2.])?;
    assert_close(&z, &[8., 9.]);
    // d/dx x^y = y * x^(y-1)
    assert_close(&gx, &[12., 6.]);
    // d/dy x^y = x^y * ln x
    assert_close(&gy, &[8. * 2f32.ln(), 9. * 3f32.ln()]);
    Ok(())
}

#[test]
fn neg() -> Result<(), NervaError> {
    let (z, gx) = run_unary(Op::Neg, &[2., -4.])?;
    assert_close(&z, &[-2., 4.]);
    assert_close(&gx, &[-1., -1.]);
    Ok(())
}

#[test]
fn relu() -> Result<(), NervaError> {
    let (z, gx) = run_unary(Op::Relu, &[2., -4., 0.])?;
    assert_close(&z, &[2., 0., 0.]);
    assert_close(&gx, &[1., 0., 0.]);
    Ok(())
}

#[test]
fn exp() -> Result<(), NervaError> {
    let (z, gx) = run_unary(Op::Exp, &[0., 1.])?;
    assert_close(&z, &[1., 1f32.exp()]);
    assert_close(&gx, &z.clone());
    Ok(())
}

#[test]
fn ln() -> Result<(), NervaError> {
    let (z, gx) = run_unary(Op::Ln, &[1., 2.])?;
    assert_close(&z, &[0., 2f32.ln()]);
    assert_close(&gx, &[1., 0.5]);
    Ok(())
}

#[test]
fn tanh() -> Result<(), NervaError> {
    let (z, gx) = run_unary(Op::Tanh, &[0., 1.])?;
    assert_close(&z, &[0., 1f32.tanh()]);
    assert_close(&gx, &[1., 1. - 1f32.tanh() * 1f32.tanh()]);
    Ok(())
}

#[test]
fn sqrt() -> Result<(), NervaError> {
    let (z, gx) = run_unary(Op::Sqrt, &[4., 9.])?;
    assert_close(&z, &[2., 3.]);
    assert_close(&gx, &[0.25, 1. / 6.]);
    Ok(())
}

#[test]
fn sum_all() -> Result<(), NervaError> {
    let (z, gx) = run_unary(Op::SumAll, &[1., 2., 3.])?;
    assert_close(&z, &[6.]);
    assert_close(&gx, &[1., 1., 1.]);
    Ok(())
}

#[test]
fn dropout_is_deterministic_and_masks_gradients() -> Result<(), NervaError> {
    let op = Op::Dropout {
        rate: 0.5,
        seed: 7,
    };
    let x = vec![1.0f32; 64];
    let (first, grad) = run_unary(op.clone(), &x)?;
    let (second, _) = run_unary(op, &x)?;
    // Seeded rng: repeated runs draw the identical mask.
    assert_close(&first, &second);
    let kept = first.iter().filter(|&&v| v != 0.).count();
    assert!(kept > 0 && kept < 64);
    // Kept elements are scaled by 1/(1-rate), dropped ones are zero in
    // both the output and the gradient.
    for (v, g) in first.iter().zip(grad.iter()) {
        if *v == 0. {
            assert_eq!(*g, 0.);
        } else {
            assert!((v - 2.).abs() < 1e-5);
            assert!((g - 2.).abs() < 1e-5);
        }
    }
    Ok(())
}

#[test]
fn gradients_accumulate_over_shared_inputs() -> Result<(), NervaError> {
    // out = x * x; both factors contribute, so dx = 2x.
    let (z, gx, gy) = run_binary(Op::Mul, &[3.], &[3.])?;
    assert_close(&z, &[9.]);
    assert_close(&gx, &[3.]);
    assert_close(&gy, &[3.]);

    let mut g = Graph::new();
    let xv = g.input([1], DType::F32, "x");
    let out = g.apply(Op::Mul, &[xv, xv], "out")?;
    let root = g.var(out).owner().unwrap();
    let mut session = Session::new(Composite::new(g, root)?, nerva_cpu::executor());
    let arguments: BTreeMap<VarId, Value> = [(xv, Value::scalar(3.0f32))].into();
    let outputs: BTreeSet<VarId> = [out].into();
    let (results, state) = session.forward(&arguments, &outputs, Device::Cpu, &outputs)?;
    assert_close(results[&out].as_f32().unwrap(), &[9.]);
    let grads = session.backward(
        state.unwrap(),
        &[(out, Value::scalar(1.0f32))].into(),
        &[xv].into(),
    )?;
    assert_close(grads[&xv].as_f32().unwrap(), &[6.]);
    Ok(())
}

#[test]
fn integer_arithmetic() -> Result<(), NervaError> {
    let mut g = Graph::new();
    let xv = g.input([2], DType::I32, "x");
    let yv = g.input([2], DType::I32, "y");
    let out = g.apply(Op::Mul, &[xv, yv], "out")?;
    let root = g.var(out).owner().unwrap();
    let mut session = Session::new(Composite::new(g, root)?, nerva_cpu::executor());

    let arguments: BTreeMap<VarId, Value> = [
        (xv, Value::from_slice([2], &[2i32, 4])?),
        (yv, Value::from_slice([2], &[3i32, -1])?),
    ]
    .into();
    let outputs: BTreeSet<VarId> = [out].into();
    let (results, _) = session.forward(&arguments, &outputs, Device::Cpu, &BTreeSet::new())?;
    assert_eq!(results[&out].as_i32().unwrap(), [6, -4].as_slice());
    Ok(())
}

#[test]
fn floating_ops_reject_integer_inputs() {
    let mut g = Graph::new();
    let xv = g.input([2], DType::I32, "x");
    assert!(matches!(
        g.apply(Op::Exp, &[xv], "out"),
        Err(NervaError::InvalidDType { .. })
    ));
}
