use crate::device::Device;
use crate::dtype::DType;
use crate::node::NodeId;
use crate::shape::Shape;
use crate::variable::VarId;
use thiserror::Error;

/// NervaError. Construction errors are fatal to the graph being built;
/// precondition violations are fatal to the offending call but leave the
/// graph, its cached network and its timestamp tables untouched; stale
/// backward state is recoverable by re-issuing a fresh forward call.
#[derive(Debug, Error)]
pub enum NervaError {
    /// The graph contains a cycle through the given variable.
    #[error("cyclic graph: variable {0} participates in a cycle")]
    CyclicGraph(VarId),
    /// The dynamic axis set was empty where at least one axis is required.
    #[error("empty dynamic axes set")]
    EmptyAxes,
    /// A serialized dictionary is missing entries or holds wrong types.
    #[error("malformed dictionary: {0}")]
    MalformedDictionary(String),
    /// A serialized dictionary declares a version this build cannot read.
    #[error("unknown serialization version {0}")]
    UnknownSerializationVersion(i64),
    /// Forward or backward was attempted while placeholders remain.
    #[error("graph has unresolved placeholders: {0:?}")]
    UnresolvedPlaceholders(Vec<VarId>),
    /// A variable was referenced that the graph does not declare.
    #[error("unknown variable {0}")]
    UnknownVariable(VarId),
    /// A node was referenced that the graph does not declare.
    #[error("unknown node {0}")]
    UnknownNode(NodeId),
    /// A required free input received no value.
    #[error("missing value for input variable {0}")]
    MissingInput(VarId),
    /// A requested output is not reachable from the graph root.
    #[error("variable {0} is not reachable from the graph root")]
    UnreachableOutput(VarId),
    /// The cached network was compiled for a different device.
    #[error("device mismatch: network is compiled for {compiled}, requested {requested}")]
    DeviceMismatch {
        /// Device the cached network was compiled for
        compiled: Device,
        /// Device requested by the current call
        requested: Device,
    },
    /// A backward state whose snapshot no longer matches current
    /// timestamps was replayed.
    #[error("stale backward state: {var} was recomputed since the forward call (snapshot {snapshot}, current {current})")]
    StaleBackwardState {
        /// Backprop root whose timestamp advanced
        var: VarId,
        /// Timestamp captured by the forward call
        snapshot: u64,
        /// Current timestamp
        current: u64,
    },
    /// A backward state produced by a different graph was replayed.
    #[error("backward state does not originate from this graph")]
    ForeignBackwardState,
    /// Backward was called with no compiled network retained.
    #[error("no forward call retained state for backward")]
    BackwardWithoutForward,
    /// A root gradient was supplied for a variable the state did not retain.
    #[error("variable {0} is not among the retained backprop roots")]
    NotABackpropRoot(VarId),
    /// A substitution key is not a placeholder in the free input list.
    #[error("variable {0} is not a placeholder of this graph")]
    NotAPlaceholder(VarId),
    /// Unexpected dtype found
    #[error("invalid dtype: expected {expected}, found {found}")]
    InvalidDType {
        /// Expected dtype
        expected: DType,
        /// Found dtype
        found: DType,
    },
    /// Unexpected shape found
    #[error("shape mismatch: expected {expected}, found {found}")]
    ShapeMismatch {
        /// Expected shape
        expected: Shape,
        /// Found shape
        found: Shape,
    },
    /// An op was applied to the wrong number of inputs.
    #[error("{op} expects {expected} inputs, got {found}")]
    InvalidArity {
        /// Op tag
        op: &'static str,
        /// Number of inputs the op consumes
        expected: usize,
        /// Number of inputs supplied
        found: usize,
    },
    /// Error returned by the execution backend.
    #[error("backend error: {0}")]
    Backend(String),
}
