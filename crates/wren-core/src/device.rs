use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Selects which evaluation plan services a registration or evaluation call.
///
/// The set is closed; `Cpu` is always backed by [`CpuBackend`](crate::CpuBackend).
/// `Cuda` is a recognized tag with no backend in this workspace, so asking
/// for its plan yields [`Error::UnknownDevice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum DeviceTag {
    #[default]
    Cpu,
    Cuda,
}

impl DeviceTag {
    /// Every tag, in declaration order.
    pub const ALL: [DeviceTag; 2] = [DeviceTag::Cpu, DeviceTag::Cuda];

    pub fn name(&self) -> &'static str {
        match self {
            DeviceTag::Cpu => "cpu",
            DeviceTag::Cuda => "cuda",
        }
    }
}

impl fmt::Display for DeviceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DeviceTag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(DeviceTag::Cpu),
            "cuda" | "gpu" => Ok(DeviceTag::Cuda),
            _ => Err(Error::UnknownDevice {
                device: s.to_string(),
            }),
        }
    }
}
