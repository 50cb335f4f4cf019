//! Execution spaces, access modes, and accelerator capability.
//!
//! These are plain value types. [`ExecutionSpace::require`] is the one
//! check here; it must run before any pointer arithmetic on device memory.

use std::fmt;
use std::str::FromStr;

use crate::error::DlextError;

/// Memory domain a buffer lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExecutionSpace {
    /// Host (CPU) memory.
    Host,
    /// Accelerator memory managed by the engine's offload backend.
    Device,
}

impl ExecutionSpace {
    /// Both spaces, host first.
    pub const ALL: [ExecutionSpace; 2] = [ExecutionSpace::Host, ExecutionSpace::Device];

    /// Dense index used for per-space bookkeeping tables.
    pub fn index(self) -> usize {
        match self {
            Self::Host => 0,
            Self::Device => 1,
        }
    }

    /// The other space.
    pub fn other(self) -> Self {
        match self {
            Self::Host => Self::Device,
            Self::Device => Self::Host,
        }
    }

    /// Fail with [`DlextError::UnsupportedExecutionSpace`] unless `self`
    /// is usable given the engine's accelerator (if any).
    pub fn require(self, accelerator: Option<Accelerator>) -> Result<(), DlextError> {
        if supports(accelerator, self) {
            Ok(())
        } else {
            Err(DlextError::UnsupportedExecutionSpace { space: self })
        }
    }
}

impl fmt::Display for ExecutionSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => write!(f, "host"),
            Self::Device => write!(f, "device"),
        }
    }
}

impl FromStr for ExecutionSpace {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "host" => Ok(Self::Host),
            "device" => Ok(Self::Device),
            other => Err(format!("unknown execution space '{other}'")),
        }
    }
}

/// Permitted operation on an exposed array.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AccessMode {
    /// The consumer only reads.
    ReadOnly,
    /// The consumer may write; the engine is told the array was modified.
    ReadWrite,
}

impl AccessMode {
    /// Whether this mode allows writes.
    pub fn is_write(self) -> bool {
        matches!(self, Self::ReadWrite)
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadOnly => write!(f, "read"),
            Self::ReadWrite => write!(f, "readwrite"),
        }
    }
}

impl FromStr for AccessMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" | "readonly" => Ok(Self::ReadOnly),
            "readwrite" => Ok(Self::ReadWrite),
            other => Err(format!("unknown access mode '{other}'")),
        }
    }
}

/// Accelerator runtime family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AcceleratorKind {
    /// NVIDIA CUDA.
    Cuda,
    /// AMD ROCm / HIP.
    Rocm,
}

/// Accelerator the engine was built with and found at runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Accelerator {
    /// Runtime family.
    pub kind: AcceleratorKind,
    /// Device ordinal the engine runs on.
    pub device_id: i32,
}

/// Whether `space` is usable given the engine's accelerator.
///
/// Host memory is always available.
pub fn supports(accelerator: Option<Accelerator>, space: ExecutionSpace) -> bool {
    match space {
        ExecutionSpace::Host => true,
        ExecutionSpace::Device => accelerator.is_some(),
    }
}
