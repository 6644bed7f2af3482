use crate::variable::VarId;

/// Id of a primitive node.
#[derive(
    Clone, Copy, PartialOrd, PartialEq, Ord, Eq, Debug, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct NodeId(usize);

/// Create new node id.
#[must_use]
pub const fn node_id(id: usize) -> NodeId {
    NodeId(id)
}

impl NodeId {
    /// Convert id to usize
    #[must_use]
    pub const fn i(self) -> usize {
        self.0
    }
}

impl core::fmt::Display for NodeId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!("n{}", self.0))
    }
}

/// Primitive operation kind. This set exists to exercise the engine;
/// it is deliberately small and elementwise except for [Op::SumAll].
#[derive(Clone, Debug, PartialEq)]
pub enum Op {
    /// Addition binary op
    Add,
    /// Subtraction binary op
    Sub,
    /// Multiplication binary op
    Mul,
    /// Division binary op
    Div,
    /// Exponentiation binary op
    Pow,
    /// Neg unary op
    Neg,
    /// ReLU unary op
    Relu,
    /// Exp unary op
    Exp,
    /// Natural logarithm unary op
    Ln,
    /// Hyperbolic tangent unary op
    Tanh,
    /// Square root unary op
    Sqrt,
    /// Reduce all elements to a scalar sum
    SumAll,
    /// Inverted dropout. The seed is graph state: it survives
    /// serialization (version 2) and is pushed into freshly built
    /// networks, so repeated forward calls draw the same mask.
    Dropout {
        /// Probability of dropping an element
        rate: f64,
        /// RNG seed for the mask
        seed: u64,
    },
}

impl Op {
    /// Get number of inputs this op consumes.
    #[must_use]
    pub const fn arity(&self) -> usize {
        match self {
            Op::Add | Op::Sub | Op::Mul | Op::Div | Op::Pow => 2,
            Op::Neg
            | Op::Relu
            | Op::Exp
            | Op::Ln
            | Op::Tanh
            | Op::Sqrt
            | Op::SumAll
            | Op::Dropout { .. } => 1,
        }
    }

    /// Check if this op carries internal state (e.g. an RNG).
    #[must_use]
    pub const fn is_stateful(&self) -> bool {
        matches!(self, Op::Dropout { .. })
    }

    /// Check if this op is only defined for floating point inputs.
    #[must_use]
    pub const fn requires_floating(&self) -> bool {
        matches!(
            self,
            Op::Pow | Op::Exp | Op::Ln | Op::Tanh | Op::Sqrt | Op::Dropout { .. }
        )
    }

    /// Get the serialization tag of this op.
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Op::Add => "add",
            Op::Sub => "sub",
            Op::Mul => "mul",
            Op::Div => "div",
            Op::Pow => "pow",
            Op::Neg => "neg",
            Op::Relu => "relu",
            Op::Exp => "exp",
            Op::Ln => "ln",
            Op::Tanh => "tanh",
            Op::Sqrt => "sqrt",
            Op::SumAll => "sum_all",
            Op::Dropout { .. } => "dropout",
        }
    }
}

impl core::fmt::Display for Op {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.tag())
    }
}

/// A primitive function: one operation with an ordered list of input
/// variables and the output variables it owns.
#[derive(Clone, Debug)]
pub struct Primitive {
    /// Operation applied by this node
    pub op: Op,
    /// Ordered input variables
    pub inputs: Vec<VarId>,
    /// Output variables owned by this node
    pub outputs: Vec<VarId>,
    /// Name, for diagnostics and serialization
    pub name: String,
}
