use crate::composite::Composite;
use crate::device::Device;
use crate::dtype::DType;
use crate::error::NervaError;
use crate::graph::Graph;
use crate::node::Op;
use crate::shape::Shape;
use crate::value::Value;
use crate::variable::{VarId, VarKind};
use std::collections::{BTreeMap, BTreeSet};

/// Id of a node inside a network plan.
#[derive(Clone, Copy, PartialOrd, PartialEq, Ord, Eq, Debug)]
pub struct InternalId(usize);

/// Create internal id from usize
#[must_use]
pub const fn internal_id(id: usize) -> InternalId {
    InternalId(id)
}

impl InternalId {
    /// Convert id to usize
    #[must_use]
    pub const fn i(self) -> usize {
        self.0
    }
}

impl core::fmt::Display for InternalId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!("i{}", self.0))
    }
}

/// One node of a network plan.
#[derive(Clone, Debug)]
pub enum PlanOp {
    /// Free input slot, populated before each run.
    Input,
    /// Parameter slot, re-populated only when its revision changes.
    Parameter,
    /// Constant baked in at build time.
    Constant(Value),
    /// A primitive operation over already-built plan nodes.
    Apply(Op),
}

/// A plan node: the executable translation of one output variable.
#[derive(Clone, Debug)]
pub struct PlanNode {
    /// What this node computes
    pub op: PlanOp,
    /// Plan nodes feeding this node, in input order
    pub inputs: Vec<InternalId>,
    /// The variable this node computes
    pub var: VarId,
    /// Shape of the computed value
    pub shape: Shape,
    /// Dtype of the computed value
    pub dtype: DType,
}

/// The compiled translation of a composite graph, specialized to one
/// (backprop-roots, outputs) configuration. Nodes are in topological
/// order: every node's inputs precede it.
#[derive(Clone, Debug)]
pub struct NetworkPlan {
    /// Plan nodes in topological order
    pub nodes: Vec<PlanNode>,
    /// Memoized map from variable to its unique plan node
    pub var_to_node: BTreeMap<VarId, InternalId>,
    /// Whether each output variable is a root of the network, i.e. is
    /// consumed by no other node
    pub is_root: BTreeMap<VarId, bool>,
    /// Gradient roots this plan was built for
    pub backprop_roots: BTreeSet<VarId>,
    /// Outputs this plan was built for
    pub outputs: BTreeSet<VarId>,
}

impl NetworkPlan {
    /// Translate `composite` into a plan for the given configuration.
    /// Every owned node reachable from the root becomes exactly one plan
    /// node per output variable, wired to already-built nodes and
    /// memoized so shared subexpressions are built once. Cycles and
    /// unresolved placeholders are fatal here.
    pub fn build(
        composite: &Composite,
        backprop_roots: &BTreeSet<VarId>,
        outputs: &BTreeSet<VarId>,
    ) -> Result<Self, NervaError> {
        let mut builder = PlanBuilder {
            graph: composite.graph(),
            nodes: Vec::new(),
            var_to_node: BTreeMap::new(),
            is_root: BTreeMap::new(),
            in_progress: BTreeSet::new(),
        };
        for &out in composite.graph().prim(composite.root()).outputs.iter() {
            builder.get_node(out)?;
        }
        for &x in outputs.iter().chain(backprop_roots.iter()) {
            if !builder.var_to_node.contains_key(&x) {
                return Err(NervaError::UnreachableOutput(x));
            }
        }
        Ok(Self {
            nodes: builder.nodes,
            var_to_node: builder.var_to_node,
            is_root: builder.is_root,
            backprop_roots: backprop_roots.clone(),
            outputs: outputs.clone(),
        })
    }

    /// Get the free input and parameter variables of this plan.
    pub fn input_vars(&self) -> impl Iterator<Item = VarId> + '_ {
        self.nodes
            .iter()
            .filter(|n| matches!(n.op, PlanOp::Input | PlanOp::Parameter))
            .map(|n| n.var)
    }
}

struct PlanBuilder<'a> {
    graph: &'a Graph,
    nodes: Vec<PlanNode>,
    var_to_node: BTreeMap<VarId, InternalId>,
    is_root: BTreeMap<VarId, bool>,
    in_progress: BTreeSet<VarId>,
}

impl PlanBuilder<'_> {
    // Builds the plan node computing `var`, building its producers on
    // demand first. Memoized by var_to_node so each variable maps to
    // exactly one plan node even when referenced by multiple consumers.
    fn get_node(&mut self, var: VarId) -> Result<InternalId, NervaError> {
        if let Some(&id) = self.var_to_node.get(&var) {
            return Ok(id);
        }
        if !self.in_progress.insert(var) {
            return Err(NervaError::CyclicGraph(var));
        }
        let v = self.graph.var(var);
        let (op, inputs) = match &v.kind {
            VarKind::Input => (PlanOp::Input, Vec::new()),
            VarKind::Parameter { .. } => (PlanOp::Parameter, Vec::new()),
            VarKind::Constant { value } => (PlanOp::Constant(value.clone()), Vec::new()),
            VarKind::Placeholder => {
                return Err(NervaError::UnresolvedPlaceholders(vec![var]));
            }
            VarKind::Output { owner, .. } => {
                let prim_inputs = self.graph.prim(*owner).inputs.clone();
                let mut ids = Vec::with_capacity(prim_inputs.len());
                for input in prim_inputs {
                    ids.push(self.get_node(input)?);
                    self.is_root.insert(input, false);
                }
                self.is_root.entry(var).or_insert(true);
                (PlanOp::Apply(self.graph.prim(*owner).op.clone()), ids)
            }
        };
        let id = InternalId(self.nodes.len());
        self.nodes.push(PlanNode {
            op,
            inputs,
            var,
            shape: v.shape.clone(),
            dtype: v.dtype,
        });
        self.var_to_node.insert(var, id);
        self.in_progress.remove(&var);
        Ok(id)
    }
}

/// The opaque compiled-network collaborator. The engine hands it a
/// [NetworkPlan] and drives it through this narrow interface; node-level
/// kernels and memory live entirely behind it.
pub trait ExecutionBackend {
    /// Handle to one compiled, device-resident network.
    type Network;

    /// Compile `plan` for `device`. When `allocate_storage` is false,
    /// reserving intermediate buffers is deferred until
    /// [ExecutionBackend::allocate_storage].
    fn build(
        &mut self,
        plan: &NetworkPlan,
        device: Device,
        allocate_storage: bool,
    ) -> Result<Self::Network, NervaError>;

    /// Reserve intermediate buffers for a network built with deferred
    /// allocation. Idempotent.
    fn allocate_storage(&mut self, network: &mut Self::Network) -> Result<(), NervaError>;

    /// Populate the input slot of `var` with `value`.
    fn set_input(
        &mut self,
        network: &mut Self::Network,
        var: VarId,
        value: &Value,
    ) -> Result<(), NervaError>;

    /// Execute forward up to the requested outputs.
    fn run_forward(
        &mut self,
        network: &mut Self::Network,
        outputs: &BTreeSet<VarId>,
    ) -> Result<(), NervaError>;

    /// Extract the forward value of `var`.
    fn get_output(&mut self, network: &Self::Network, var: VarId) -> Result<Value, NervaError>;

    /// Populate the output-gradient slot of root `var` with `value`.
    fn set_output_gradient(
        &mut self,
        network: &mut Self::Network,
        var: VarId,
        value: &Value,
    ) -> Result<(), NervaError>;

    /// Execute backward, accumulating gradients for the `wrt` variables.
    fn run_backward(
        &mut self,
        network: &mut Self::Network,
        wrt: &BTreeSet<VarId>,
    ) -> Result<(), NervaError>;

    /// Extract the aggregated gradient of input `var`. An input that no
    /// root depends on yields a zero gradient.
    fn get_input_gradient(
        &mut self,
        network: &Self::Network,
        var: VarId,
    ) -> Result<Value, NervaError>;
}
