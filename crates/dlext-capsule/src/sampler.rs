//! DLPack capsules over views.
//!
//! A [`Sampler`] owns a heap-allocated bridge holding the `DLManagedTensor`
//! together with the shape and stride arrays it points into, the optional
//! owned copy of the data, and the validity record of the window it was
//! issued in. Handing the tensor to a foreign consumer with
//! [`Sampler::into_raw`] leaks the bridge; the consumer's call to the
//! tensor's deleter reclaims it.
//!
//! # Ownership
//!
//! - [`Ownership::Borrow`] tensors point straight into engine memory and
//!   are valid only while the issuing window is current. Every checked
//!   accessor fails with [`DlextError::StaleView`] once the hook refreshed
//!   its views or was torn down. A consumer that already holds the raw
//!   pointer is on its own.
//! - [`Ownership::Copy`] tensors own a packed buffer in the requested space
//!   and never go stale.
//!
//! Writing through a read-only tensor is not detected at the ABI boundary
//! and is the consumer's responsibility.

use std::ffi::c_void;
use std::fmt;
use std::ptr;
use std::sync::Arc;

use dlext_core::{
    AccessMode, DlextError, ExecutionSpace, OwnedBuffer, ParticleEngine, ParticleProperty,
    ScalarType, StridedExtent,
};
use dlext_view::{ExposureWindow, View, WindowStamp, WriteLease};

use crate::copy::{gather_host, packed_strides, scatter_host, Element};
use crate::device::{dl_device, dl_dtype};
use crate::ffi::{DLDataType, DLDevice, DLManagedTensor, DLTensor};

/// Whether a capsule borrows engine memory or owns a copy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Ownership {
    /// Points into live engine memory.
    Borrow,
    /// Owns a packed copy.
    Copy,
}

impl fmt::Display for Ownership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Borrow => write!(f, "borrow"),
            Self::Copy => write!(f, "copy"),
        }
    }
}

struct Bridge {
    managed: DLManagedTensor,
    shape: Vec<i64>,
    strides: Vec<i64>,
    scalar: ScalarType,
    property: ParticleProperty,
    space: ExecutionSpace,
    mode: AccessMode,
    storage: Storage,
    _lease: Option<WriteLease>,
}

enum Storage {
    Borrowed {
        window: Arc<ExposureWindow>,
        stamp: WindowStamp,
    },
    Owned(Box<dyn OwnedBuffer>),
}

struct TensorParts {
    data: *mut c_void,
    byte_offset: u64,
    shape: Vec<i64>,
    strides: Vec<i64>,
    scalar: ScalarType,
    device: DLDevice,
}

impl Bridge {
    fn boxed(
        parts: TensorParts,
        view: &View,
        storage: Storage,
        lease: Option<WriteLease>,
    ) -> Box<Self> {
        let TensorParts {
            data,
            byte_offset,
            shape,
            strides,
            scalar,
            device,
        } = parts;
        let mut bridge = Box::new(Self {
            managed: DLManagedTensor {
                dl_tensor: DLTensor {
                    data,
                    device,
                    ndim: shape.len() as i32,
                    dtype: dl_dtype(scalar),
                    shape: ptr::null_mut(),
                    strides: ptr::null_mut(),
                    byte_offset,
                },
                manager_ctx: ptr::null_mut(),
                deleter: Some(delete_bridge),
            },
            shape,
            strides,
            scalar,
            property: view.property(),
            space: view.space(),
            mode: view.mode(),
            storage,
            _lease: lease,
        });
        // The Vec heap buffers do not move with the Box.
        bridge.managed.dl_tensor.shape = bridge.shape.as_mut_ptr();
        bridge.managed.dl_tensor.strides = bridge.strides.as_mut_ptr();
        bridge
    }

    fn check(&self) -> Result<(), DlextError> {
        match &self.storage {
            Storage::Borrowed { window, stamp } => {
                window
                    .check(*stamp)
                    .map_err(|reason| DlextError::StaleView {
                        property: self.property,
                        reason,
                    })
            }
            Storage::Owned(_) => Ok(()),
        }
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        tracing::trace!(property = %self.property, space = %self.space, "capsule released");
    }
}

/// Deleter installed in every exported `DLManagedTensor`.
#[allow(unsafe_code)]
unsafe extern "C" fn delete_bridge(managed: *mut DLManagedTensor) {
    if managed.is_null() {
        return;
    }
    // SAFETY: `managed` was produced by `Sampler::into_raw`, which stored
    // the `Box::into_raw` pointer of its bridge in `manager_ctx`. DLPack
    // consumers call the deleter exactly once.
    unsafe {
        let ctx = (*managed).manager_ctx.cast::<Bridge>();
        if !ctx.is_null() {
            drop(Box::from_raw(ctx));
        }
    }
}

/// A DLPack tensor over one property in one execution space.
pub struct Sampler {
    bridge: Box<Bridge>,
}

// SAFETY: the bridge's raw pointers are only dereferenced by consumers of
// the exported tensor. Validity is tracked through the `Arc`-shared
// window, whose state is atomic, and owned buffers are `Send`.
#[allow(unsafe_code)]
unsafe impl Send for Sampler {}

impl Sampler {
    /// Zero-copy capsule over a view that is resident in its requested
    /// space.
    ///
    /// `lease` must be held for read-write views and is released when the
    /// capsule is.
    pub fn borrow(
        view: &View,
        engine: &dyn ParticleEngine,
        window: &Arc<ExposureWindow>,
        lease: Option<WriteLease>,
    ) -> Result<Self, DlextError> {
        let layout = view.layout(engine)?;
        if !view.is_resident() {
            return Err(DlextError::PropertyUnavailable {
                property: view.property(),
                space: view.space(),
            });
        }
        let device = dl_device(layout.space, engine.accelerator())?;
        let parts = TensorParts {
            data: layout.ptr,
            byte_offset: layout.byte_offset,
            shape: layout.shape.to_vec(),
            strides: layout.strides.to_vec(),
            scalar: layout.dtype,
            device,
        };
        let bridge = Bridge::boxed(
            parts,
            view,
            Storage::Borrowed {
                window: Arc::clone(window),
                stamp: window.stamp(),
            },
            lease,
        );
        Ok(Self { bridge })
    }

    /// Capsule over a packed copy of the view's data in the requested
    /// space.
    ///
    /// Host-to-host copies are done here; anything touching device memory
    /// goes through the engine's transfer hook and blocks until it
    /// completes.
    #[allow(unsafe_code)]
    pub fn copy(view: &View, engine: &dyn ParticleEngine) -> Result<Self, DlextError> {
        let layout = view.layout(engine)?;
        let (from, to) = (layout.space, view.space());
        let device = dl_device(to, engine.accelerator())?;
        let extent = layout.extent();

        let mut buffer: Box<dyn OwnedBuffer> = if from == ExecutionSpace::Host
            && to == ExecutionSpace::Host
        {
            // SAFETY: the layout was checked against the live engine
            // generation above, so it still describes readable host memory.
            Box::new(unsafe { gather_host(&extent) })
        } else {
            engine
                .transfer(&extent, from, to)
                .map_err(|reason| DlextError::CrossSpaceCopyFailed { from, to, reason })?
        };

        if buffer.len_bytes() != layout.packed_bytes() || buffer.space() != to {
            return Err(DlextError::CrossSpaceCopyFailed {
                from,
                to,
                reason: format!(
                    "transfer returned {} bytes on {}, expected {} bytes on {to}",
                    buffer.len_bytes(),
                    buffer.space(),
                    layout.packed_bytes()
                ),
            });
        }

        let shape = layout.shape.to_vec();
        let parts = TensorParts {
            data: buffer.as_mut_ptr(),
            byte_offset: 0,
            strides: packed_strides(&shape),
            shape,
            scalar: layout.dtype,
            device,
        };
        let bridge = Bridge::boxed(parts, view, Storage::Owned(buffer), None);
        Ok(Self { bridge })
    }

    /// Ownership mode.
    pub fn ownership(&self) -> Ownership {
        match self.bridge.storage {
            Storage::Borrowed { .. } => Ownership::Borrow,
            Storage::Owned(_) => Ownership::Copy,
        }
    }

    /// The exposed property.
    pub fn property(&self) -> ParticleProperty {
        self.bridge.property
    }

    /// The requested space.
    pub fn space(&self) -> ExecutionSpace {
        self.bridge.space
    }

    /// The access mode the capsule was issued for.
    pub fn mode(&self) -> AccessMode {
        self.bridge.mode
    }

    /// Element type.
    pub fn dtype(&self) -> ScalarType {
        self.bridge.scalar
    }

    /// DLPack element type.
    pub fn dl_dtype(&self) -> DLDataType {
        self.bridge.managed.dl_tensor.dtype
    }

    /// DLPack device.
    pub fn device(&self) -> DLDevice {
        self.bridge.managed.dl_tensor.device
    }

    /// Tensor extents.
    pub fn shape(&self) -> &[i64] {
        &self.bridge.shape
    }

    /// Tensor strides, in elements.
    pub fn strides(&self) -> &[i64] {
        &self.bridge.strides
    }

    /// Whether the capsule is still backed by valid memory.
    pub fn is_valid(&self) -> bool {
        self.bridge.check().is_ok()
    }

    /// Fail with [`DlextError::StaleView`] if the capsule went stale.
    pub fn check(&self) -> Result<(), DlextError> {
        self.bridge.check()
    }

    /// The tensor descriptor.
    pub fn tensor(&self) -> Result<&DLTensor, DlextError> {
        self.check()?;
        Ok(&self.bridge.managed.dl_tensor)
    }

    /// The data pointer, offset applied.
    pub fn data_ptr(&self) -> Result<*mut c_void, DlextError> {
        let t = self.tensor()?;
        Ok(t.data.cast::<u8>().wrapping_add(t.byte_offset as usize).cast())
    }

    /// Copy the elements out in row-major order.
    ///
    /// Host tensors only; `T` must match [`dtype`](Self::dtype).
    #[allow(unsafe_code)]
    pub fn read_host<T: Element>(&self) -> Result<Vec<T>, DlextError> {
        let extent = self.host_extent::<T>()?;
        // SAFETY: the capsule was just checked valid, so the extent still
        // describes readable host memory owned by the engine or the bridge.
        let buf = unsafe { gather_host(&extent) };
        Ok(buf.to_vec())
    }

    /// Write `values` (row-major) through the capsule.
    ///
    /// Host tensors issued read-write only; `values` must cover every
    /// element and `T` must match [`dtype`](Self::dtype).
    #[allow(unsafe_code)]
    pub fn write_host<T: Element>(&mut self, values: &[T]) -> Result<(), DlextError> {
        if !self.mode().is_write() {
            return Err(DlextError::IncompatibleLayout {
                property: self.property(),
                reason: "capsule was issued read-only".into(),
            });
        }
        let extent = self.host_extent::<T>()?;
        if values.len() != extent.element_count() {
            return Err(DlextError::IncompatibleLayout {
                property: self.property(),
                reason: format!(
                    "{} values for {} elements",
                    values.len(),
                    extent.element_count()
                ),
            });
        }
        // SAFETY: the capsule is valid and read-write, so the extent
        // describes writable host memory guarded by this capsule's lease
        // (borrow) or owned by the bridge (copy).
        unsafe { scatter_host(&extent, values) };
        Ok(())
    }

    fn host_extent<T: Element>(&self) -> Result<StridedExtent<'_>, DlextError> {
        let t = self.tensor()?;
        if t.device.device_type != crate::ffi::K_DL_CPU {
            return Err(DlextError::UnsupportedExecutionSpace {
                space: ExecutionSpace::Device,
            });
        }
        if T::DTYPE != self.dtype() {
            return Err(DlextError::IncompatibleLayout {
                property: self.property(),
                reason: format!("tensor is {}, requested {}", self.dtype(), T::DTYPE),
            });
        }
        Ok(StridedExtent {
            ptr: t.data.cast_const(),
            byte_offset: t.byte_offset,
            shape: &self.bridge.shape,
            strides: &self.bridge.strides,
            dtype: self.dtype(),
        })
    }

    /// Hand the managed tensor to a foreign consumer.
    ///
    /// The consumer must call the tensor's deleter exactly once; that is
    /// the only way the capsule's resources are released afterwards.
    #[allow(unsafe_code)]
    pub fn into_raw(self) -> Result<*mut DLManagedTensor, DlextError> {
        self.check()?;
        let raw = Box::into_raw(self.bridge);
        // SAFETY: `raw` is the unique, live pointer just returned by
        // `Box::into_raw`.
        unsafe {
            (*raw).managed.manager_ctx = raw.cast();
            Ok(ptr::addr_of_mut!((*raw).managed))
        }
    }
}

impl fmt::Debug for Sampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sampler")
            .field("property", &self.property())
            .field("space", &self.space())
            .field("mode", &self.mode())
            .field("ownership", &self.ownership())
            .field("shape", &self.shape())
            .field("strides", &self.strides())
            .field("valid", &self.is_valid())
            .finish()
    }
}

const _: fn() = || {
    fn assert<T: Send>() {}
    assert::<Sampler>();
};
