//! The contract between the bridge and the simulation engine.
//!
//! The engine owns every per-particle array and is the sole mutator. The
//! bridge only ever sees raw descriptors ([`RawArray`]) and asks the engine
//! to move data between spaces ([`ParticleEngine::synchronize`],
//! [`ParticleEngine::transfer`]). Both traits are object safe; the bridge
//! always works through `&dyn` / `&mut dyn` so the engine is passed
//! explicitly on every call.

use std::ffi::c_void;

use crate::id::{Generation, TagInt, TimeStep};
use crate::property::{ArrayKind, ScalarType};
use crate::space::{self, Accelerator, ExecutionSpace};

/// Descriptor of one engine array in one space.
///
/// `row_stride` is in elements, not bytes. A 3-component array stored with
/// a padding column has `components == 3` and `row_stride == 4`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawArray {
    /// Base address of row 0.
    pub ptr: *mut c_void,
    /// Number of rows.
    pub rows: usize,
    /// Meaningful elements per row.
    pub components: usize,
    /// Elements between the starts of consecutive rows.
    pub row_stride: usize,
    /// Element type.
    pub dtype: ScalarType,
    /// Space the memory lives in.
    pub space: ExecutionSpace,
}

impl RawArray {
    /// Address of element `elements` past the base, without dereferencing.
    pub fn offset_ptr(&self, elements: usize) -> *mut c_void {
        self.ptr
            .cast::<u8>()
            .wrapping_add(elements * self.dtype.size_bytes())
            .cast()
    }

    /// Bytes spanned from the base to the end of the last row.
    pub fn span_bytes(&self) -> usize {
        if self.rows == 0 {
            return 0;
        }
        ((self.rows - 1) * self.row_stride + self.components) * self.dtype.size_bytes()
    }
}

/// A strided region to be copied by [`ParticleEngine::transfer`].
///
/// Strides are in elements, one per dimension, as in DLPack.
#[derive(Clone, Copy, Debug)]
pub struct StridedExtent<'a> {
    /// Base address.
    pub ptr: *const c_void,
    /// Offset of the first element from `ptr`, in bytes.
    pub byte_offset: u64,
    /// Extent per dimension.
    pub shape: &'a [i64],
    /// Stride per dimension, in elements.
    pub strides: &'a [i64],
    /// Element type.
    pub dtype: ScalarType,
}

impl StridedExtent<'_> {
    /// Number of elements described.
    pub fn element_count(&self) -> usize {
        self.shape.iter().map(|&d| d.max(0) as usize).product()
    }

    /// Size of the packed row-major copy of this region.
    pub fn packed_bytes(&self) -> usize {
        self.element_count() * self.dtype.size_bytes()
    }
}

/// A packed buffer owned by a copy-mode capsule.
///
/// Allocated either by the bridge (host) or by the engine's transfer hook
/// (device). Dropping it frees the memory.
pub trait OwnedBuffer: Send {
    /// Start of the buffer.
    fn as_mut_ptr(&mut self) -> *mut c_void;
    /// Length in bytes.
    fn len_bytes(&self) -> usize;
    /// Space the buffer lives in.
    fn space(&self) -> ExecutionSpace;
}

/// Read access to a running particle engine.
pub trait ParticleEngine {
    /// Particles owned by this process (LAMMPS `nlocal`).
    fn local_particle_count(&self) -> usize;

    /// Particles across all processes (LAMMPS `natoms`).
    fn global_particle_count(&self) -> u64;

    /// Number of particle types (LAMMPS `ntypes`).
    fn type_count(&self) -> usize;

    /// Current allocation generation.
    fn generation(&self) -> Generation;

    /// Current timestep.
    fn timestep(&self) -> TimeStep;

    /// Accelerator backend, if one is compiled in and present.
    fn accelerator(&self) -> Option<Accelerator>;

    /// Whether `space` can be requested at all.
    fn supports(&self, space: ExecutionSpace) -> bool {
        space::supports(self.accelerator(), space)
    }

    /// Host copy of the tags of local particles, in storage order.
    ///
    /// Only guaranteed current after `synchronize(Host, &[ArrayKind::Tags])`.
    fn local_tags(&self) -> &[TagInt];

    /// Descriptor of `kind` in `space`, or `None` if the engine does not
    /// keep that array in that space.
    fn array(&self, kind: ArrayKind, space: ExecutionSpace) -> Option<RawArray>;

    /// Bring `kinds` up to date in `space`.
    fn synchronize(&mut self, space: ExecutionSpace, kinds: &[ArrayKind]);

    /// Record that `kinds` may have been written in `space`.
    fn mark_modified(&mut self, space: ExecutionSpace, kinds: &[ArrayKind]);

    /// Copy a strided region from `from` into a packed buffer in `to`.
    ///
    /// Engines without an accelerator never need this; the default fails.
    fn transfer(
        &self,
        _extent: &StridedExtent<'_>,
        from: ExecutionSpace,
        to: ExecutionSpace,
    ) -> Result<Box<dyn OwnedBuffer>, String> {
        Err(format!("no transfer backend for {from} -> {to}"))
    }
}

/// The engine's per-step fix registry.
pub trait StepPipeline {
    /// Register `id` to be called at the phases in `mask` (LAMMPS
    /// `FixConst` bits).
    fn register_fix(&mut self, id: &str, mask: u32);

    /// Remove `id`. Unknown ids are ignored.
    fn unregister_fix(&mut self, id: &str);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn array(rows: usize, components: usize, row_stride: usize) -> RawArray {
        RawArray {
            ptr: std::ptr::null_mut(),
            rows,
            components,
            row_stride,
            dtype: ScalarType::Float64,
            space: ExecutionSpace::Host,
        }
    }

    #[test]
    fn span_covers_last_row_only_to_components() {
        assert_eq!(array(3, 3, 4).span_bytes(), (2 * 4 + 3) * 8);
        assert_eq!(array(0, 3, 4).span_bytes(), 0);
    }

    #[test]
    fn offset_ptr_scales_by_dtype() {
        let a = array(1, 1, 1);
        assert_eq!(a.offset_ptr(3) as usize, 24);
    }

    #[test]
    fn extent_counts_elements() {
        let shape = [5, 3];
        let strides = [4, 1];
        let e = StridedExtent {
            ptr: std::ptr::null(),
            byte_offset: 0,
            shape: &shape,
            strides: &strides,
            dtype: ScalarType::Float32,
        };
        assert_eq!(e.element_count(), 15);
        assert_eq!(e.packed_bytes(), 60);
    }

    struct Bare;

    impl ParticleEngine for Bare {
        fn local_particle_count(&self) -> usize {
            0
        }
        fn global_particle_count(&self) -> u64 {
            0
        }
        fn type_count(&self) -> usize {
            1
        }
        fn generation(&self) -> Generation {
            Generation(1)
        }
        fn timestep(&self) -> TimeStep {
            TimeStep(0)
        }
        fn accelerator(&self) -> Option<Accelerator> {
            None
        }
        fn local_tags(&self) -> &[TagInt] {
            &[]
        }
        fn array(&self, _: ArrayKind, _: ExecutionSpace) -> Option<RawArray> {
            None
        }
        fn synchronize(&mut self, _: ExecutionSpace, _: &[ArrayKind]) {}
        fn mark_modified(&mut self, _: ExecutionSpace, _: &[ArrayKind]) {}
    }

    #[test]
    fn default_transfer_fails_without_backend() {
        let shape = [2];
        let strides = [1];
        let e = StridedExtent {
            ptr: std::ptr::null(),
            byte_offset: 0,
            shape: &shape,
            strides: &strides,
            dtype: ScalarType::Float64,
        };
        let err = Bare
            .transfer(&e, ExecutionSpace::Host, ExecutionSpace::Device)
            .err()
            .unwrap();
        assert!(err.contains("no transfer backend"));
        assert!(Bare.supports(ExecutionSpace::Host));
        assert!(!Bare.supports(ExecutionSpace::Device));
    }

    #[test]
    fn traits_are_object_safe() {
        fn _engine(_: &dyn ParticleEngine) {}
        fn _pipeline(_: &mut dyn StepPipeline) {}
        fn _buffer(_: Box<dyn OwnedBuffer>) {}
    }
}
