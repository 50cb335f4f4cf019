//! `repr(C)` mirror of the DLPack 0.x ABI.
//!
//! Field types follow `dlpack.h` exactly. Enum-valued fields are kept as
//! plain integers so a foreign producer can never hand us an invalid
//! discriminant.

use std::ffi::{c_void, CStr};

/// `kDLCPU`.
pub const K_DL_CPU: i32 = 1;
/// `kDLCUDA`.
pub const K_DL_CUDA: i32 = 2;
/// `kDLCUDAHost`.
pub const K_DL_CUDA_HOST: i32 = 3;
/// `kDLROCM`.
pub const K_DL_ROCM: i32 = 10;

/// `kDLInt`.
pub const K_DL_INT: u8 = 0;
/// `kDLUInt`.
pub const K_DL_UINT: u8 = 1;
/// `kDLFloat`.
pub const K_DL_FLOAT: u8 = 2;

/// Capsule name of an unconsumed tensor.
pub const DLTENSOR_NAME: &CStr = c"dltensor";
/// Capsule name after a consumer took ownership.
pub const USED_DLTENSOR_NAME: &CStr = c"used_dltensor";

/// `DLDevice`.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DLDevice {
    /// One of the `K_DL_*` device constants.
    pub device_type: i32,
    /// Device ordinal; `0` for host memory.
    pub device_id: i32,
}

/// `DLDataType`.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DLDataType {
    /// One of the `K_DL_*` type-code constants.
    pub code: u8,
    /// Bits per lane.
    pub bits: u8,
    /// Lanes per element; always 1 here.
    pub lanes: u16,
}

/// `DLTensor`.
#[repr(C)]
#[derive(Debug)]
pub struct DLTensor {
    /// Base data pointer.
    pub data: *mut c_void,
    /// Where `data` lives.
    pub device: DLDevice,
    /// Number of dimensions.
    pub ndim: i32,
    /// Element type.
    pub dtype: DLDataType,
    /// `ndim` extents.
    pub shape: *mut i64,
    /// `ndim` strides in elements, or null for compact row-major.
    pub strides: *mut i64,
    /// Offset of the first element from `data`, in bytes.
    pub byte_offset: u64,
}

/// `DLManagedTensor`.
#[repr(C)]
#[derive(Debug)]
pub struct DLManagedTensor {
    /// The described tensor.
    pub dl_tensor: DLTensor,
    /// Producer-private context.
    pub manager_ctx: *mut c_void,
    /// Called by the consumer exactly once when done.
    pub deleter: Option<unsafe extern "C" fn(*mut DLManagedTensor)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{align_of, size_of};

    #[test]
    fn scalar_struct_sizes_match_dlpack_h() {
        assert_eq!(size_of::<DLDevice>(), 8);
        assert_eq!(size_of::<DLDataType>(), 4);
        assert_eq!(align_of::<DLDataType>(), 2);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn tensor_struct_sizes_match_dlpack_h() {
        assert_eq!(size_of::<DLTensor>(), 48);
        assert_eq!(size_of::<DLManagedTensor>(), 64);
    }

    #[test]
    fn capsule_names() {
        assert_eq!(DLTENSOR_NAME.to_bytes(), b"dltensor");
        assert_eq!(USED_DLTENSOR_NAME.to_bytes(), b"used_dltensor");
    }
}
