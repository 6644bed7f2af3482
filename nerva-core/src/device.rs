/// Descriptor of a compute device. The engine passes it through to the
/// execution backend unchanged; it only ever compares devices for equality.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Device {
    /// Host CPU
    Cpu,
    /// Accelerator with the given index
    Accelerator(u32),
}

impl core::fmt::Display for Device {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Device::Cpu => f.write_str("cpu"),
            Device::Accelerator(i) => f.write_fmt(format_args!("accelerator:{i}")),
        }
    }
}
