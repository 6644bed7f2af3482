use crate::composite::Composite;
use crate::device::Device;
use crate::error::NervaError;
use crate::network::{ExecutionBackend, NetworkPlan};
use crate::value::Value;
use crate::variable::{VarId, VarKind};
use core::sync::atomic::{AtomicU64, Ordering};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, trace};

static NEXT_SESSION_UID: AtomicU64 = AtomicU64::new(0);

/// Token produced by a forward call that retained intermediate state.
/// It links that forward call to the one backward call permitted to
/// consume it: [Session::backward] takes it by value, and a successful
/// backward call advances the retained roots' timestamps itself.
/// Replaying backward after any forward or backward activity advanced a
/// retained root's timestamp fails with
/// [NervaError::StaleBackwardState], which also catches clones of an
/// already consumed state.
#[derive(Clone, Debug)]
pub struct BackwardState {
    uid: u64,
    device: Device,
    snapshot: BTreeMap<VarId, u64>,
}

impl BackwardState {
    /// Get the device of the originating forward call.
    #[must_use]
    pub fn device(&self) -> Device {
        self.device
    }

    /// Get the retained backprop roots.
    pub fn roots(&self) -> impl Iterator<Item = VarId> + '_ {
        self.snapshot.keys().copied()
    }
}

struct CachedNetwork<H> {
    handle: H,
    plan: NetworkPlan,
    device: Device,
    storage_allocated: bool,
}

/// The execution orchestrator: owns a composite graph, an execution
/// backend, the lazily compiled network and the timestamp tables, and
/// implements the forward/backward public contract. All operations take
/// `&mut self`; one session is never shared between threads without
/// external serialization, while independent sessions share nothing.
pub struct Session<E: ExecutionBackend> {
    uid: u64,
    composite: Composite,
    backend: E,
    network: Option<CachedNetwork<E::Network>>,
    // Last revision pushed into the current network, per parameter.
    parameter_timestamps: BTreeMap<VarId, u64>,
    // Forward tick at which each variable was last computed.
    forward_timestamps: BTreeMap<VarId, u64>,
    clock: u64,
}

impl<E: ExecutionBackend> Session<E> {
    /// Create a session evaluating `composite` on `backend`.
    pub fn new(composite: Composite, backend: E) -> Self {
        Self {
            uid: NEXT_SESSION_UID.fetch_add(1, Ordering::Relaxed),
            composite,
            backend,
            network: None,
            parameter_timestamps: BTreeMap::new(),
            forward_timestamps: BTreeMap::new(),
            clock: 0,
        }
    }

    /// Get the composite graph.
    #[must_use]
    pub fn composite(&self) -> &Composite {
        &self.composite
    }

    /// Get mutable access to the composite graph, e.g. for mutating
    /// parameter values or building placeholder replacement subgraphs.
    pub fn composite_mut(&mut self) -> &mut Composite {
        &mut self.composite
    }

    /// Replace placeholders in the composite graph and drop the compiled
    /// network, which was specialized to the old structure.
    pub fn replace_placeholders(
        &mut self,
        substitutions: &BTreeMap<VarId, VarId>,
    ) -> Result<(), NervaError> {
        self.composite.replace_placeholders(substitutions)?;
        self.network = None;
        self.parameter_timestamps.clear();
        Ok(())
    }

    /// Compile the network for the given configuration without running
    /// it. Forward compiles on demand; this exists to make compilation
    /// and storage allocation explicit when the caller wants them early.
    pub fn compile(
        &mut self,
        device: Device,
        backprop_roots: &BTreeSet<VarId>,
        outputs: &BTreeSet<VarId>,
        allocate_storage: bool,
    ) -> Result<(), NervaError> {
        self.get_compiled_network(device, backprop_roots, outputs, allocate_storage)?;
        Ok(())
    }

    /// Evaluate the graph. `arguments` must supply a value for every
    /// free input; `outputs` names the variables whose values to return;
    /// when `retain_backward_state_for` is non-empty the call returns a
    /// [BackwardState] carrying a timestamp snapshot of those roots for
    /// exactly one later [Session::backward] call.
    pub fn forward(
        &mut self,
        arguments: &BTreeMap<VarId, Value>,
        outputs: &BTreeSet<VarId>,
        device: Device,
        retain_backward_state_for: &BTreeSet<VarId>,
    ) -> Result<(BTreeMap<VarId, Value>, Option<BackwardState>), NervaError> {
        let unresolved = self.composite.unresolved_placeholders();
        if !unresolved.is_empty() {
            return Err(NervaError::UnresolvedPlaceholders(unresolved));
        }
        self.validate_arguments(arguments)?;
        self.get_compiled_network(device, retain_backward_state_for, outputs, true)?;

        // The network is populated and run before any cached state is
        // touched, so a failing call leaves the session unchanged.
        let Some(net) = self.network.as_mut() else {
            return Err(NervaError::Backend("no network after compilation".into()));
        };
        let mut pushed_parameters = Vec::new();
        for var in net.plan.input_vars().collect::<Vec<VarId>>() {
            match &self.composite.graph().var(var).kind {
                VarKind::Input => {
                    let value = arguments
                        .get(&var)
                        .ok_or(NervaError::MissingInput(var))?;
                    self.backend.set_input(&mut net.handle, var, value)?;
                }
                VarKind::Parameter { value, revision } => {
                    if self.parameter_timestamps.get(&var) == Some(revision) {
                        trace!(var = %var, "parameter unchanged, not re-pushed");
                    } else {
                        self.backend.set_input(&mut net.handle, var, value)?;
                        pushed_parameters.push((var, *revision));
                    }
                }
                _ => {}
            }
        }
        let to_compute: BTreeSet<VarId> = outputs
            .iter()
            .chain(retain_backward_state_for.iter())
            .copied()
            .collect();
        self.backend.run_forward(&mut net.handle, &to_compute)?;

        let mut results = BTreeMap::new();
        for &out in outputs {
            results.insert(out, self.backend.get_output(&net.handle, out)?);
        }

        // The run succeeded, commit timestamps.
        for (var, revision) in pushed_parameters {
            self.parameter_timestamps.insert(var, revision);
        }
        self.clock += 1;
        for &var in &to_compute {
            self.forward_timestamps.insert(var, self.clock);
        }
        let state = if retain_backward_state_for.is_empty() {
            None
        } else {
            Some(BackwardState {
                uid: self.uid,
                device,
                snapshot: retain_backward_state_for
                    .iter()
                    .map(|&var| (var, self.clock))
                    .collect(),
            })
        };
        Ok((results, state))
    }

    /// Backpropagate `root_gradients` through the network retained by the
    /// forward call that produced `state`, returning the aggregated
    /// gradient of every variable in `input_gradients`.
    pub fn backward(
        &mut self,
        state: BackwardState,
        root_gradients: &BTreeMap<VarId, Value>,
        input_gradients: &BTreeSet<VarId>,
    ) -> Result<BTreeMap<VarId, Value>, NervaError> {
        if state.uid != self.uid {
            return Err(NervaError::ForeignBackwardState);
        }
        let Some(net) = self.network.as_mut() else {
            return Err(NervaError::BackwardWithoutForward);
        };
        if state.device != net.device {
            return Err(NervaError::DeviceMismatch {
                compiled: net.device,
                requested: state.device,
            });
        }
        for (&var, &snapshot) in &state.snapshot {
            let current = self.forward_timestamps.get(&var).copied().unwrap_or(0);
            if current != snapshot {
                return Err(NervaError::StaleBackwardState {
                    var,
                    snapshot,
                    current,
                });
            }
        }
        for &var in root_gradients.keys() {
            if !state.snapshot.contains_key(&var) {
                return Err(NervaError::NotABackpropRoot(var));
            }
        }
        let plan_inputs: BTreeSet<VarId> = net.plan.input_vars().collect();
        for &var in input_gradients {
            if !plan_inputs.contains(&var) {
                return Err(NervaError::UnknownVariable(var));
            }
        }
        for (&var, value) in root_gradients {
            self.backend
                .set_output_gradient(&mut net.handle, var, value)?;
        }
        self.backend.run_backward(&mut net.handle, input_gradients)?;
        let mut results = BTreeMap::new();
        for &var in input_gradients {
            results.insert(var, self.backend.get_input_gradient(&net.handle, var)?);
        }
        // Consuming the state advances the retained roots' timestamps,
        // so replaying it (or a clone of it) is stale from here on.
        self.clock += 1;
        for &var in state.snapshot.keys() {
            self.forward_timestamps.insert(var, self.clock);
        }
        Ok(results)
    }

    // Returns the cached network when its (backprop-roots, outputs)
    // configuration equals the requested one, rebuilding otherwise.
    // The rebuild is an explicit, logged event; a device change fails
    // fast instead of rebuilding (see DESIGN.md).
    fn get_compiled_network(
        &mut self,
        device: Device,
        backprop_roots: &BTreeSet<VarId>,
        outputs: &BTreeSet<VarId>,
        allocate_storage: bool,
    ) -> Result<(), NervaError> {
        if let Some(net) = &mut self.network {
            if net.device != device {
                return Err(NervaError::DeviceMismatch {
                    compiled: net.device,
                    requested: device,
                });
            }
            if &net.plan.backprop_roots == backprop_roots && &net.plan.outputs == outputs {
                if allocate_storage && !net.storage_allocated {
                    self.backend.allocate_storage(&mut net.handle)?;
                    net.storage_allocated = true;
                }
                return Ok(());
            }
            debug!(
                "recompiling network: backprop root or output configuration changed"
            );
        }
        let plan = NetworkPlan::build(&self.composite, backprop_roots, outputs)?;
        let handle = self.backend.build(&plan, device, allocate_storage)?;
        // Swap in the new network only after a successful build; every
        // parameter must be pushed into it afresh.
        self.network = Some(CachedNetwork {
            handle,
            plan,
            device,
            storage_allocated: allocate_storage,
        });
        self.parameter_timestamps.clear();
        Ok(())
    }

    fn validate_arguments(
        &mut self,
        arguments: &BTreeMap<VarId, Value>,
    ) -> Result<(), NervaError> {
        let free: BTreeSet<VarId> = self.composite.inputs().iter().copied().collect();
        for (&var, value) in arguments {
            if !free.contains(&var) || !self.composite.graph().var(var).is_input() {
                return Err(NervaError::UnknownVariable(var));
            }
            let v = self.composite.graph().var(var);
            if value.shape() != &v.shape {
                return Err(NervaError::ShapeMismatch {
                    expected: v.shape.clone(),
                    found: value.shape().clone(),
                });
            }
            if value.dtype() != v.dtype {
                return Err(NervaError::InvalidDType {
                    expected: v.dtype,
                    found: value.dtype(),
                });
            }
        }
        Ok(())
    }
}
