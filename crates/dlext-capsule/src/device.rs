//! Mapping from execution spaces and scalar types to DLPack descriptors.

use dlext_core::{Accelerator, AcceleratorKind, DlextError, ExecutionSpace, ScalarType};

use crate::ffi::{
    DLDataType, DLDevice, K_DL_CPU, K_DL_CUDA, K_DL_FLOAT, K_DL_INT, K_DL_ROCM, K_DL_UINT,
};

/// Device descriptor for memory in `space`.
///
/// Host memory is always `kDLCPU` with id 0. Device memory needs an
/// accelerator and takes its runtime family and ordinal from it.
pub fn dl_device(
    space: ExecutionSpace,
    accelerator: Option<Accelerator>,
) -> Result<DLDevice, DlextError> {
    match (space, accelerator) {
        (ExecutionSpace::Host, _) => Ok(DLDevice {
            device_type: K_DL_CPU,
            device_id: 0,
        }),
        (ExecutionSpace::Device, Some(acc)) => Ok(DLDevice {
            device_type: match acc.kind {
                AcceleratorKind::Cuda => K_DL_CUDA,
                AcceleratorKind::Rocm => K_DL_ROCM,
            },
            device_id: acc.device_id,
        }),
        (ExecutionSpace::Device, None) => Err(DlextError::UnsupportedExecutionSpace { space }),
    }
}

/// DLPack type descriptor for `dtype`.
pub fn dl_dtype(dtype: ScalarType) -> DLDataType {
    let code = match dtype {
        ScalarType::Float32 | ScalarType::Float64 => K_DL_FLOAT,
        ScalarType::Int32 | ScalarType::Int64 => K_DL_INT,
        ScalarType::UInt32 => K_DL_UINT,
    };
    DLDataType {
        code,
        bits: (dtype.size_bytes() * 8) as u8,
        lanes: 1,
    }
}

/// Inverse of [`dl_dtype`]; `None` for types the engine never uses.
pub fn scalar_type(dtype: DLDataType) -> Option<ScalarType> {
    if dtype.lanes != 1 {
        return None;
    }
    match (dtype.code, dtype.bits) {
        (K_DL_FLOAT, 32) => Some(ScalarType::Float32),
        (K_DL_FLOAT, 64) => Some(ScalarType::Float64),
        (K_DL_INT, 32) => Some(ScalarType::Int32),
        (K_DL_INT, 64) => Some(ScalarType::Int64),
        (K_DL_UINT, 32) => Some(ScalarType::UInt32),
        _ => None,
    }
}
