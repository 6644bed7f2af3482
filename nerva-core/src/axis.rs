use crate::error::NervaError;
use core::sync::atomic::{AtomicU64, Ordering};

/// Process-wide counter for auto-generated dynamic axis names.
/// Starts at 0; only ever produces unique names, so no teardown exists.
static NEXT_AUTO_GENERATED_DYNAMIC_AXIS: AtomicU64 = AtomicU64::new(0);

const AUTO_GENERATED_DYNAMIC_AXIS_PREFIX: &str = "autoGeneratedDynamicAxis_";

/// Internal name standing for the default (sequence, batch) dynamic axes.
pub const INTERNAL_DEFAULT_DYNAMIC_AXIS_NAME: &str = "defaultDynamicAxis";
/// Internal name standing for batch-only dynamic axes.
pub const INTERNAL_NO_SEQUENCE_AXIS_NAME: &str = "noSequenceAxis";

const DEFAULT_DYNAMIC_AXIS_NAME: &str = "defaultDynamicAxis";
const DEFAULT_BATCH_AXIS_NAME: &str = "defaultBatchAxis";

/// A named dynamic axis of an input variable.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Axis {
    name: String,
}

impl Axis {
    /// Create a dynamic axis with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// The default sequence axis.
    #[must_use]
    pub fn default_dynamic_axis() -> Self {
        Self::new(DEFAULT_DYNAMIC_AXIS_NAME)
    }

    /// The default batch axis.
    #[must_use]
    pub fn default_batch_axis() -> Self {
        Self::new(DEFAULT_BATCH_AXIS_NAME)
    }

    /// Get name of this axis.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl core::fmt::Display for Axis {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.name)
    }
}

/// Produce a fresh uniquely named dynamic axis. Thread-safe across all
/// graph instances in the process.
#[must_use]
pub fn next_auto_generated_dynamic_axis() -> Axis {
    let n = NEXT_AUTO_GENERATED_DYNAMIC_AXIS.fetch_add(1, Ordering::Relaxed);
    Axis::new(format!("{AUTO_GENERATED_DYNAMIC_AXIS_PREFIX}{n}"))
}

/// Construct the internal axis name used to serialize the dynamic axes of
/// an input variable. An empty axis set is a construction error.
pub fn internal_dynamic_axis_name_from_dynamic_axes(
    dynamic_axes: &[Axis],
) -> Result<String, NervaError> {
    if dynamic_axes.is_empty() {
        return Err(NervaError::EmptyAxes);
    }
    if dynamic_axes == [Axis::default_batch_axis()] {
        Ok(INTERNAL_NO_SEQUENCE_AXIS_NAME.into())
    } else if dynamic_axes == [Axis::default_dynamic_axis(), Axis::default_batch_axis()] {
        Ok(INTERNAL_DEFAULT_DYNAMIC_AXIS_NAME.into())
    } else {
        Ok(dynamic_axes[0].name().into())
    }
}

/// Reconstruct the dynamic axes of an input variable from its internal
/// axis name. Inverse of [internal_dynamic_axis_name_from_dynamic_axes]
/// for the axis lists that function produces.
#[must_use]
pub fn dynamic_axes_from_internal_dynamic_axis_name(internal_name: &str) -> Vec<Axis> {
    if internal_name.starts_with(INTERNAL_DEFAULT_DYNAMIC_AXIS_NAME) {
        vec![Axis::default_dynamic_axis(), Axis::default_batch_axis()]
    } else if internal_name.starts_with(INTERNAL_NO_SEQUENCE_AXIS_NAME) {
        vec![Axis::default_batch_axis()]
    } else {
        vec![Axis::new(internal_name), Axis::default_batch_axis()]
    }
}
