use crate::axis::Axis;
use crate::dtype::DType;
use crate::error::NervaError;
use crate::node::{node_id, NodeId, Op, Primitive};
use crate::shape::Shape;
use crate::value::Value;
use crate::variable::{var_id, VarId, VarKind, Variable};

/// Arena owning all variables and primitive nodes of one graph.
/// Nodes and variables are immutable after creation except for
/// parameter value mutation and placeholder rewiring, both of which
/// go through the methods below.
#[derive(Clone, Debug, Default)]
pub struct Graph {
    vars: Vec<Variable>,
    prims: Vec<Primitive>,
}

impl Graph {
    /// Create an empty graph arena.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a free input variable with the default dynamic axes.
    pub fn input(
        &mut self,
        shape: impl Into<Shape>,
        dtype: DType,
        name: impl Into<String>,
    ) -> VarId {
        self.push_var(Variable {
            name: name.into(),
            shape: shape.into(),
            dtype,
            kind: VarKind::Input,
            dynamic_axes: vec![Axis::default_dynamic_axis(), Axis::default_batch_axis()],
        })
    }

    /// Create a free input variable with explicit dynamic axes. An empty
    /// axis set is a construction error.
    pub fn input_with_axes(
        &mut self,
        shape: impl Into<Shape>,
        dtype: DType,
        name: impl Into<String>,
        dynamic_axes: Vec<Axis>,
    ) -> Result<VarId, NervaError> {
        if dynamic_axes.is_empty() {
            return Err(NervaError::EmptyAxes);
        }
        Ok(self.push_var(Variable {
            name: name.into(),
            shape: shape.into(),
            dtype,
            kind: VarKind::Input,
            dynamic_axes,
        }))
    }

    /// Create a parameter variable holding `value`. Its revision counter
    /// starts at 0 and is bumped by [Graph::set_parameter_value].
    pub fn parameter(&mut self, value: Value, name: impl Into<String>) -> VarId {
        let shape = value.shape().clone();
        let dtype = value.dtype();
        self.push_var(Variable {
            name: name.into(),
            shape,
            dtype,
            kind: VarKind::Parameter { value, revision: 0 },
            dynamic_axes: Vec::new(),
        })
    }

    /// Create a constant variable holding `value`.
    pub fn constant(&mut self, value: Value, name: impl Into<String>) -> VarId {
        let shape = value.shape().clone();
        let dtype = value.dtype();
        self.push_var(Variable {
            name: name.into(),
            shape,
            dtype,
            kind: VarKind::Constant { value },
            dynamic_axes: Vec::new(),
        })
    }

    /// Create a placeholder variable to be substituted later.
    pub fn placeholder(
        &mut self,
        shape: impl Into<Shape>,
        dtype: DType,
        name: impl Into<String>,
    ) -> VarId {
        self.push_var(Variable {
            name: name.into(),
            shape: shape.into(),
            dtype,
            kind: VarKind::Placeholder,
            dynamic_axes: Vec::new(),
        })
    }

    /// Apply `op` to `inputs`, creating a new primitive node and its
    /// single output variable. Validates arity, shapes and dtypes.
    pub fn apply(
        &mut self,
        op: Op,
        inputs: &[VarId],
        name: impl Into<String>,
    ) -> Result<VarId, NervaError> {
        if inputs.len() != op.arity() {
            return Err(NervaError::InvalidArity {
                op: op.tag(),
                expected: op.arity(),
                found: inputs.len(),
            });
        }
        for &x in inputs {
            if x.i() >= self.vars.len() {
                return Err(NervaError::UnknownVariable(x));
            }
        }
        let first = self.var(inputs[0]);
        let dtype = first.dtype;
        let shape = first.shape.clone();
        if op.requires_floating() && !dtype.is_floating() {
            return Err(NervaError::InvalidDType {
                expected: DType::F32,
                found: dtype,
            });
        }
        for &x in &inputs[1..] {
            let v = self.var(x);
            if v.dtype != dtype {
                return Err(NervaError::InvalidDType {
                    expected: dtype,
                    found: v.dtype,
                });
            }
            if v.shape != shape {
                return Err(NervaError::ShapeMismatch {
                    expected: shape,
                    found: v.shape.clone(),
                });
            }
        }
        let out_shape = if matches!(op, Op::SumAll) {
            Shape::scalar()
        } else {
            shape
        };
        let name = name.into();
        let nid = node_id(self.prims.len());
        let out = self.push_var(Variable {
            name: format!("{name}_output"),
            shape: out_shape,
            dtype,
            kind: VarKind::Output {
                owner: nid,
                index: 0,
            },
            dynamic_axes: Vec::new(),
        });
        self.prims.push(Primitive {
            op,
            inputs: inputs.to_vec(),
            outputs: vec![out],
            name,
        });
        Ok(out)
    }

    /// Get variable x.
    #[must_use]
    pub fn var(&self, x: VarId) -> &Variable {
        &self.vars[x.i()]
    }

    /// Get primitive node n.
    #[must_use]
    pub fn prim(&self, n: NodeId) -> &Primitive {
        &self.prims[n.i()]
    }

    /// Check that x names a variable of this graph.
    #[must_use]
    pub fn contains_var(&self, x: VarId) -> bool {
        x.i() < self.vars.len()
    }

    /// Get number of variables in the arena.
    #[must_use]
    pub fn num_vars(&self) -> usize {
        self.vars.len()
    }

    /// Get number of primitive nodes in the arena.
    #[must_use]
    pub fn num_prims(&self) -> usize {
        self.prims.len()
    }

    /// Overwrite the value of parameter x and bump its revision counter.
    /// The next forward call re-pushes it into the compiled network.
    pub fn set_parameter_value(&mut self, x: VarId, new_value: Value) -> Result<(), NervaError> {
        if x.i() >= self.vars.len() {
            return Err(NervaError::UnknownVariable(x));
        }
        let var = &mut self.vars[x.i()];
        let VarKind::Parameter { value, revision } = &mut var.kind else {
            return Err(NervaError::UnknownVariable(x));
        };
        if new_value.shape() != &var.shape {
            return Err(NervaError::ShapeMismatch {
                expected: var.shape.clone(),
                found: new_value.shape().clone(),
            });
        }
        if new_value.dtype() != var.dtype {
            return Err(NervaError::InvalidDType {
                expected: var.dtype,
                found: new_value.dtype(),
            });
        }
        *value = new_value;
        *revision += 1;
        Ok(())
    }

    /// Get the current revision counter of parameter x.
    #[must_use]
    pub fn parameter_revision(&self, x: VarId) -> Option<u64> {
        if let VarKind::Parameter { revision, .. } = self.var(x).kind {
            Some(revision)
        } else {
            None
        }
    }

    /// Get the current value of parameter or constant x.
    #[must_use]
    pub fn stored_value(&self, x: VarId) -> Option<&Value> {
        match &self.var(x).kind {
            VarKind::Parameter { value, .. } | VarKind::Constant { value } => Some(value),
            _ => None,
        }
    }

    /// Replace every occurrence of `placeholder` in node input lists with
    /// `replacement`. The placeholder variable itself stays in the arena,
    /// now unreferenced.
    pub(crate) fn rebind(&mut self, placeholder: VarId, replacement: VarId) {
        for prim in &mut self.prims {
            for input in &mut prim.inputs {
                if *input == placeholder {
                    *input = replacement;
                }
            }
        }
    }

    pub(crate) fn push_var(&mut self, var: Variable) -> VarId {
        let id = var_id(self.vars.len());
        self.vars.push(var);
        id
    }

    pub(crate) fn push_prim(&mut self, prim: Primitive) -> NodeId {
        let id = node_id(self.prims.len());
        self.prims.push(prim);
        id
    }
}
