use nerva_core::device::Device;
use nerva_core::dtype::DType;
use nerva_core::error::NervaError;
use nerva_core::network::{internal_id, ExecutionBackend, InternalId, NetworkPlan, PlanOp};
use nerva_core::node::Op;
use nerva_core::value::{Data, Value};
use nerva_core::variable::VarId;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

/// Plan interpreter executing every node as a standalone parallel kernel.
pub struct CpuExecutor {}

impl CpuExecutor {
    pub(crate) fn new() -> Self {
        Self {}
    }
}

/// One compiled network: the plan plus per-node value and gradient slots.
pub struct CpuNetwork {
    plan: NetworkPlan,
    values: Vec<Option<Value>>,
    grads: Vec<Option<Value>>,
    out_grads: BTreeMap<InternalId, Value>,
    dropout_masks: BTreeMap<InternalId, Vec<bool>>,
    storage_allocated: bool,
}

fn unary<T: Copy + Send + Sync>(data: &[T], op: impl Fn(T) -> T + Send + Sync) -> Vec<T> {
    data.par_iter().copied().map(op).collect()
}

fn binary<T: Copy + Send + Sync>(
    xdata: &[T],
    ydata: &[T],
    op: impl Fn(T, T) -> T + Send + Sync,
) -> Vec<T> {
    xdata
        .par_iter()
        .copied()
        .zip(ydata.par_iter().copied())
        .map(|(x, y)| op(x, y))
        .collect()
}

fn int_dtype_err() -> NervaError {
    NervaError::InvalidDType {
        expected: DType::F32,
        found: DType::I32,
    }
}

// Elementwise op over any dtype. Duplicating the closure tokens per arm
// lets one expression serve f32, f64 and i32 alike.
macro_rules! numeric_binary {
    ($x:expr, $y:expr, $op:expr) => {{
        match ($x, $y) {
            (Data::F32(x), Data::F32(y)) => Data::F32(binary(x, y, $op)),
            (Data::F64(x), Data::F64(y)) => Data::F64(binary(x, y, $op)),
            (Data::I32(x), Data::I32(y)) => Data::I32(binary(x, y, $op)),
            _ => {
                return Err(NervaError::Backend(
                    "operand dtypes diverged inside the network".into(),
                ))
            }
        }
    }};
}

// Elementwise op defined for floating dtypes only.
macro_rules! float_binary {
    ($x:expr, $y:expr, $op:expr) => {{
        match ($x, $y) {
            (Data::F32(x), Data::F32(y)) => Data::F32(binary(x, y, $op)),
            (Data::F64(x), Data::F64(y)) => Data::F64(binary(x, y, $op)),
            _ => return Err(int_dtype_err()),
        }
    }};
}

macro_rules! numeric_unary {
    ($x:expr, $op:expr) => {{
        match $x {
            Data::F32(x) => Data::F32(unary(x, $op)),
            Data::F64(x) => Data::F64(unary(x, $op)),
            Data::I32(x) => Data::I32(unary(x, $op)),
        }
    }};
}

macro_rules! float_unary {
    ($x:expr, $op:expr) => {{
        match $x {
            Data::F32(x) => Data::F32(unary(x, $op)),
            Data::F64(x) => Data::F64(unary(x, $op)),
            Data::I32(_) => return Err(int_dtype_err()),
        }
    }};
}

impl CpuNetwork {
    fn node(&self, var: VarId) -> Result<InternalId, NervaError> {
        self.plan
            .var_to_node
            .get(&var)
            .copied()
            .ok_or(NervaError::UnknownVariable(var))
    }

    fn value(&self, id: InternalId) -> Result<&Value, NervaError> {
        self.values[id.i()]
            .as_ref()
            .ok_or_else(|| NervaError::Backend(format!("value of node {id} was not computed")))
    }

    // Internal ids of every node the requested outputs transitively need.
    fn needed(&self, requested: &BTreeSet<InternalId>) -> Vec<bool> {
        let mut needed = vec![false; self.plan.nodes.len()];
        for &id in requested {
            needed[id.i()] = true;
        }
        for i in (0..self.plan.nodes.len()).rev() {
            if needed[i] {
                for input in &self.plan.nodes[i].inputs {
                    needed[input.i()] = true;
                }
            }
        }
        needed
    }

    fn forward_node(&mut self, id: InternalId) -> Result<(), NervaError> {
        let node = &self.plan.nodes[id.i()];
        let op = match &node.op {
            PlanOp::Input | PlanOp::Parameter => {
                if self.values[id.i()].is_none() {
                    return Err(NervaError::MissingInput(node.var));
                }
                return Ok(());
            }
            PlanOp::Constant(value) => {
                self.values[id.i()] = Some(value.clone());
                return Ok(());
            }
            PlanOp::Apply(op) => op.clone(),
        };
        let inputs: Vec<InternalId> = node.inputs.clone();
        let shape = node.shape.clone();
        let data = match op {
            Op::Add => {
                let (x, y) = (self.value(inputs[0])?.data(), self.value(inputs[1])?.data());
                numeric_binary!(x, y, |x, y| x + y)
            }
            Op::Sub => {
                let (x, y) = (self.value(inputs[0])?.data(), self.value(inputs[1])?.data());
                numeric_binary!(x, y, |x, y| x - y)
            }
            Op::Mul => {
                let (x, y) = (self.value(inputs[0])?.data(), self.value(inputs[1])?.data());
                numeric_binary!(x, y, |x, y| x * y)
            }
            Op::Div => {
                let (x, y) = (self.value(inputs[0])?.data(), self.value(inputs[1])?.data());
                numeric_binary!(x, y, |x, y| x / y)
            }
            Op::Pow => {
                let (x, y) = (self.value(inputs[0])?.data(), self.value(inputs[1])?.data());
                float_binary!(x, y, |x, y| x.powf(y))
            }
            Op::Neg => numeric_unary!(self.value(inputs[0])?.data(), |x| -x),
            Op::Relu => {
                let x = self.value(inputs[0])?.data();
                match x {
                    Data::F32(x) => Data::F32(unary(x, |x| x.max(0.))),
                    Data::F64(x) => Data::F64(unary(x, |x| x.max(0.))),
                    Data::I32(x) => Data::I32(unary(x, |x| x.max(0))),
                }
            }
            Op::Exp => float_unary!(self.value(inputs[0])?.data(), |x| x.exp()),
            Op::Ln => float_unary!(self.value(inputs[0])?.data(), |x| x.ln()),
            Op::Tanh => float_unary!(self.value(inputs[0])?.data(), |x| x.tanh()),
            Op::Sqrt => float_unary!(self.value(inputs[0])?.data(), |x| x.sqrt()),
            Op::SumAll => match self.value(inputs[0])?.data() {
                Data::F32(x) => Data::F32(vec![x.par_iter().sum()]),
                Data::F64(x) => Data::F64(vec![x.par_iter().sum()]),
                Data::I32(x) => Data::I32(vec![x.par_iter().sum()]),
            },
            Op::Dropout { rate, seed } => {
                // A fixed seed per node keeps repeated forward runs over
                // unchanged state bit-identical.
                let x = self.value(inputs[0])?;
                let mut rng = SmallRng::seed_from_u64(seed);
                let mask: Vec<bool> = (0..x.numel()).map(|_| rng.gen::<f64>() >= rate).collect();
                let scale = 1.0 / (1.0 - rate);
                let data = match x.data() {
                    Data::F32(x) => Data::F32(
                        x.iter()
                            .zip(mask.iter())
                            .map(|(&x, &keep)| if keep { x * scale as f32 } else { 0. })
                            .collect(),
                    ),
                    Data::F64(x) => Data::F64(
                        x.iter()
                            .zip(mask.iter())
                            .map(|(&x, &keep)| if keep { x * scale } else { 0. })
                            .collect(),
                    ),
                    Data::I32(_) => return Err(int_dtype_err()),
                };
                self.dropout_masks.insert(id, mask);
                data
            }
        };
        self.values[id.i()] = Some(Value::new(shape, data)?);
        Ok(())
    }

    // Gradient contributions of one node, pushed to its inputs. `g` is
    // the accumulated gradient of the node's own output.
    fn backward_node(&mut self, id: InternalId) -> Result<(), NervaError> {
        let node = &self.plan.nodes[id.i()];
        let PlanOp::Apply(op) = node.op.clone() else {
            return Ok(());
        };
        let Some(g) = self.grads[id.i()].clone() else {
            return Ok(());
        };
        let inputs: Vec<InternalId> = node.inputs.clone();
        match op {
            Op::Add => {
                self.accumulate(inputs[0], g.clone())?;
                self.accumulate(inputs[1], g)?;
            }
            Op::Sub => {
                let gy = Value::new(
                    g.shape().clone(),
                    numeric_unary!(g.data(), |x| -x),
                )?;
                self.accumulate(inputs[0], g)?;
                self.accumulate(inputs[1], gy)?;
            }
            Op::Mul => {
                let x = self.value(inputs[0])?.clone();
                let y = self.value(inputs[1])?.clone();
                let gx = float_binary!(g.data(), y.data(), |g, y| g * y);
                let gy = float_binary!(g.data(), x.data(), |g, x| g * x);
                self.accumulate(inputs[0], Value::new(x.shape().clone(), gx)?)?;
                self.accumulate(inputs[1], Value::new(y.shape().clone(), gy)?)?;
            }
            Op::Div => {
                let y = self.value(inputs[1])?.clone();
                let v = self.value(id)?.clone();
                let gx = float_binary!(g.data(), y.data(), |g, y| g / y);
                let gx = Value::new(y.shape().clone(), gx)?;
                let gy = float_binary!(gx.data(), v.data(), |gx, v| -gx * v);
                self.accumulate(inputs[1], Value::new(y.shape().clone(), gy)?)?;
                self.accumulate(inputs[0], gx)?;
            }
            Op::Pow => {
                let x = self.value(inputs[0])?.clone();
                let y = self.value(inputs[1])?.clone();
                let v = self.value(id)?.clone();
                let t = float_binary!(x.data(), y.data(), |x, y| y * x.powf(y - 1.));
                let gx = float_binary!(g.data(), &t, |g, t| g * t);
                let t = float_binary!(v.data(), x.data(), |v, x| v * x.ln());
                let gy = float_binary!(g.data(), &t, |g, t| g * t);
                self.accumulate(inputs[0], Value::new(x.shape().clone(), gx)?)?;
                self.accumulate(inputs[1], Value::new(y.shape().clone(), gy)?)?;
            }
            Op::Neg => {
                let gx = numeric_unary!(g.data(), |x| -x);
                self.accumulate(inputs[0], Value::new(g.shape().clone(), gx)?)?;
            }
            Op::Relu => {
                let x = self.value(inputs[0])?.clone();
                let gx = float_binary!(g.data(), x.data(), |g, x| if x > 0. { g } else { 0. });
                self.accumulate(inputs[0], Value::new(x.shape().clone(), gx)?)?;
            }
            Op::Exp => {
                let v = self.value(id)?.clone();
                let gx = float_binary!(g.data(), v.data(), |g, v| g * v);
                self.accumulate(inputs[0], Value::new(v.shape().clone(), gx)?)?;
            }
            Op::Ln => {
                let x = self.value(inputs[0])?.clone();
                let gx = float_binary!(g.data(), x.data(), |g, x| g / x);
                self.accumulate(inputs[0], Value::new(x.shape().clone(), gx)?)?;
            }
            Op::Tanh => {
                let v = self.value(id)?.clone();
                let gx = float_binary!(g.data(), v.data(), |g, v| g * (1. - v * v));
                self.accumulate(inputs[0], Value::new(v.shape().clone(), gx)?)?;
            }
            Op::Sqrt => {
                let v = self.value(id)?.clone();
                let gx = float_binary!(g.data(), v.data(), |g, v| g / (2. * v));
                self.accumulate(inputs[0], Value::new(v.shape().clone(), gx)?)?;
            }
            Op::SumAll => {
                let x = self.value(inputs[0])?.clone();
                let gx = match g.data() {
                    Data::F32(g) => Data::F32(vec![g[0]; x.numel()]),
                    Data::F64(g) => Data::F64(vec![g[0]; x.numel()]),
                    Data::I32(_) => return Err(int_dtype_err()),
                };
                self.accumulate(inputs[0], Value::new(x.shape().clone(), gx)?)?;
            }
            Op::Dropout { rate, .. } => {
                let mask = self
                    .dropout_masks
                    .get(&id)
                    .ok_or_else(|| NervaError::Backend("dropout mask missing".into()))?;
                let scale = 1.0 / (1.0 - rate);
                let gx = match g.data() {
                    Data::F32(g) => Data::F32(
                        g.iter()
                            .zip(mask.iter())
                            .map(|(&g, &keep)| if keep { g * scale as f32 } else { 0. })
                            .collect(),
                    ),
                    Data::F64(g) => Data::F64(
                        g.iter()
                            .zip(mask.iter())
                            .map(|(&g, &keep)| if keep { g * scale } else { 0. })
                            .collect(),
                    ),
                    Data::I32(_) => return Err(int_dtype_err()),
                };
                self.accumulate(inputs[0], Value::new(g.shape().clone(), gx)?)?;
            }
        }
        Ok(())
    }

    fn accumulate(&mut self, id: InternalId, contribution: Value) -> Result<(), NervaError> {
        let slot = &mut self.grads[id.i()];
        match slot.take() {
            None => *slot = Some(contribution),
            Some(prev) => {
                let data = numeric_binary!(prev.data(), contribution.data(), |x, y| x + y);
                *slot = Some(Value::new(prev.shape().clone(), data)?);
            }
        }
        Ok(())
    }
}

impl ExecutionBackend for CpuExecutor {
    type Network = CpuNetwork;

    fn build(
        &mut self,
        plan: &NetworkPlan,
        device: Device,
        allocate_storage: bool,
    ) -> Result<CpuNetwork, NervaError> {
        if device != Device::Cpu {
            return Err(NervaError::Backend(format!(
                "cpu backend cannot target device {device}"
            )));
        }
        let mut net = CpuNetwork {
            values: vec![None; plan.nodes.len()],
            grads: vec![None; plan.nodes.len()],
            out_grads: BTreeMap::new(),
            dropout_masks: BTreeMap::new(),
            storage_allocated: false,
            plan: plan.clone(),
        };
        if allocate_storage {
            self.allocate_storage(&mut net)?;
        }
        Ok(net)
    }

    fn allocate_storage(&mut self, network: &mut CpuNetwork) -> Result<(), NervaError> {
        if network.storage_allocated {
            return Ok(());
        }
        for (slot, node) in network.values.iter_mut().zip(network.plan.nodes.iter()) {
            if slot.is_none() {
                if let PlanOp::Apply(_) = node.op {
                    *slot = Some(Value::zeros(node.shape.clone(), node.dtype));
                }
            }
        }
        network.storage_allocated = true;
        Ok(())
    }

    fn set_input(
        &mut self,
        network: &mut CpuNetwork,
        var: VarId,
        value: &Value,
    ) -> Result<(), NervaError> {
        let id = network.node(var)?;
        let node = &network.plan.nodes[id.i()];
        if !matches!(node.op, PlanOp::Input | PlanOp::Parameter) {
            return Err(NervaError::Backend(format!(
                "{var} is not an input slot of the network"
            )));
        }
        if *value.shape() != node.shape {
            return Err(NervaError::ShapeMismatch {
                expected: node.shape.clone(),
                found: value.shape().clone(),
            });
        }
        if value.dtype() != node.dtype {
            return Err(NervaError::InvalidDType {
                expected: node.dtype,
                found: value.dtype(),
            });
        }
        network.values[id.i()] = Some(value.clone());
        Ok(())
    }

    fn run_forward(
        &mut self,
        network: &mut CpuNetwork,
        outputs: &BTreeSet<VarId>,
    ) -> Result<(), NervaError> {
        let mut requested = BTreeSet::new();
        for &var in outputs {
            requested.insert(network.node(var)?);
        }
        network.grads = vec![None; network.plan.nodes.len()];
        network.out_grads.clear();
        let needed = network.needed(&requested);
        for i in 0..network.plan.nodes.len() {
            if needed[i] {
                network.forward_node(internal_id(i))?;
            }
        }
        Ok(())
    }

    fn get_output(&mut self, network: &CpuNetwork, var: VarId) -> Result<Value, NervaError> {
        let id = network.node(var)?;
        Ok(network.value(id)?.clone())
    }

    fn set_output_gradient(
        &mut self,
        network: &mut CpuNetwork,
        var: VarId,
        value: &Value,
    ) -> Result<(), NervaError> {
        if !network.plan.backprop_roots.contains(&var) {
            return Err(NervaError::NotABackpropRoot(var));
        }
        let id = network.node(var)?;
        let node = &network.plan.nodes[id.i()];
        if *value.shape() != node.shape {
            return Err(NervaError::ShapeMismatch {
                expected: node.shape.clone(),
                found: value.shape().clone(),
            });
        }
        if value.dtype() != node.dtype {
            return Err(NervaError::InvalidDType {
                expected: node.dtype,
                found: value.dtype(),
            });
        }
        network.out_grads.insert(id, value.clone());
        Ok(())
    }

    fn run_backward(
        &mut self,
        network: &mut CpuNetwork,
        _wrt: &BTreeSet<VarId>,
    ) -> Result<(), NervaError> {
        network.grads = vec![None; network.plan.nodes.len()];
        for (&id, g) in core::mem::take(&mut network.out_grads).iter() {
            network.grads[id.i()] = Some(g.clone());
        }
        for i in (0..network.plan.nodes.len()).rev() {
            network.backward_node(internal_id(i))?;
        }
        Ok(())
    }

    fn get_input_gradient(
        &mut self,
        network: &CpuNetwork,
        var: VarId,
    ) -> Result<Value, NervaError> {
        let id = network.node(var)?;
        let node = &network.plan.nodes[id.i()];
        Ok(match &network.grads[id.i()] {
            Some(g) => g.clone(),
            None => Value::zeros(node.shape.clone(), node.dtype),
        })
    }
}
