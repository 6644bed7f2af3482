use crate::axis::Axis;
use crate::dtype::DType;
use crate::node::NodeId;
use crate::shape::Shape;
use crate::value::Value;

/// Id of a variable. Variables are compared and hashed by identity,
/// which in the arena representation is this index.
#[derive(
    Clone, Copy, PartialOrd, PartialEq, Ord, Eq, Debug, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct VarId(usize);

/// Create new variable id.
#[must_use]
pub const fn var_id(id: usize) -> VarId {
    VarId(id)
}

impl VarId {
    /// Convert id to usize
    #[must_use]
    pub const fn i(self) -> usize {
        self.0
    }
}

impl core::fmt::Display for VarId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!("v{}", self.0))
    }
}

/// Kind of a variable.
#[derive(Clone, Debug)]
pub enum VarKind {
    /// Free input supplied by the caller on every forward call.
    Input,
    /// Learnable parameter. Carries its current value and a revision
    /// counter that is bumped on every external mutation, so unchanged
    /// parameters are not re-pushed into the compiled network.
    Parameter {
        /// Current parameter value
        value: Value,
        /// Revision counter, starts at 0
        revision: u64,
    },
    /// Constant baked into the compiled network at build time.
    Constant {
        /// Constant value
        value: Value,
    },
    /// Placeholder awaiting substitution. Execution is a precondition
    /// violation while any placeholder remains in the free input list.
    Placeholder,
    /// Output produced by a primitive. The back-reference to the owning
    /// node is non-owning; ownership of nodes flows from the composite
    /// graph downward.
    Output {
        /// Producing node
        owner: NodeId,
        /// Index into the producing node's output list
        index: usize,
    },
}

/// A typed tensor slot in the graph.
#[derive(Clone, Debug)]
pub struct Variable {
    /// Name, for diagnostics and serialization
    pub name: String,
    /// Shape of the slot
    pub shape: Shape,
    /// Element dtype of the slot
    pub dtype: DType,
    /// Kind of the slot
    pub kind: VarKind,
    /// Dynamic axes of the slot. Only meaningful for inputs; serialized
    /// through their internal axis name.
    pub dynamic_axes: Vec<Axis>,
}

impl Variable {
    /// Check if self is produced by a node.
    #[must_use]
    pub fn is_output(&self) -> bool {
        matches!(self.kind, VarKind::Output { .. })
    }

    /// Get the producing node, if self is an output.
    #[must_use]
    pub fn owner(&self) -> Option<NodeId> {
        if let VarKind::Output { owner, .. } = self.kind {
            Some(owner)
        } else {
            None
        }
    }

    /// Check if self is a placeholder.
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        matches!(self.kind, VarKind::Placeholder)
    }

    /// Check if self is a parameter.
    #[must_use]
    pub fn is_parameter(&self) -> bool {
        matches!(self.kind, VarKind::Parameter { .. })
    }

    /// Check if self is a free input.
    #[must_use]
    pub fn is_input(&self) -> bool {
        matches!(self.kind, VarKind::Input)
    }
}
