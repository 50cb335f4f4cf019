//! Mock particle engine for dlext development.
//!
//! [`MockEngine`] implements [`ParticleEngine`] and [`StepPipeline`] over
//! plain `Vec` storage laid out the way LAMMPS/Kokkos lays out its atom
//! arrays: coordinates, velocities and forces are four columns wide with a
//! companion scalar (packed type, per-particle mass, per-particle energy)
//! in the fourth column. An optional device mirror stands in for the
//! accelerator copy of a Kokkos DualView.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::cell::Cell;
use std::ffi::c_void;

use dlext_core::image;
use dlext_core::{
    Accelerator, AcceleratorKind, ArrayKind, ExecutionSpace, Generation, ImageInt, OwnedBuffer,
    ParticleEngine, RawArray, ScalarType, StepPipeline, StridedExtent, Tag, TagInt, TimeStep,
};
use indexmap::IndexMap;
use rand_chacha::rand_core::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Row width of the coordinate, velocity and force blocks.
pub const ROW_STRIDE: usize = 4;

/// Spare rows allocated past `nlocal`, like LAMMPS `nmax`.
pub const HEADROOM: usize = 2;

#[derive(Clone, Debug, Default)]
struct Store {
    x: Vec<f64>,
    v: Vec<f64>,
    f: Vec<f64>,
    types: Vec<i32>,
    tags: Vec<TagInt>,
    images: Vec<ImageInt>,
}

impl Store {
    fn seeded(nlocal: usize, ntypes: usize, first_tag: usize) -> Self {
        let mut s = Self::zeroed(nlocal + HEADROOM);
        for i in 0..nlocal {
            s.fill_row(i, (first_tag + i) as TagInt, ntypes);
        }
        s
    }

    fn zeroed(capacity: usize) -> Self {
        Self {
            x: vec![0.0; capacity * ROW_STRIDE],
            v: vec![0.0; capacity * ROW_STRIDE],
            f: vec![0.0; capacity * ROW_STRIDE],
            types: vec![0; capacity],
            tags: vec![0; capacity],
            images: vec![0; capacity],
        }
    }

    fn capacity(&self) -> usize {
        self.tags.len()
    }

    fn fill_row(&mut self, i: usize, tag: TagInt, ntypes: usize) {
        let t = tag as f64;
        let ty = (tag as usize % ntypes.max(1)) as i32 + 1;
        let r = i * ROW_STRIDE;
        self.x[r..r + ROW_STRIDE].copy_from_slice(&[t, 10.0 * t, 100.0 * t, ty as f64]);
        self.v[r..r + ROW_STRIDE].copy_from_slice(&[0.1 * t, 0.2 * t, 0.3 * t, ty as f64]);
        self.f[r..r + ROW_STRIDE].copy_from_slice(&[-t, -2.0 * t, -3.0 * t, 0.01 * t]);
        self.types[i] = ty;
        self.tags[i] = tag;
        let ix = (tag % 3) as ImageInt - 1;
        self.images[i] = image::pack(ix, 0, 1).expect("mock image offsets are in range");
    }

    fn swap_rows(&mut self, a: usize, b: usize) {
        for block in [&mut self.x, &mut self.v, &mut self.f] {
            for c in 0..ROW_STRIDE {
                block.swap(a * ROW_STRIDE + c, b * ROW_STRIDE + c);
            }
        }
        self.types.swap(a, b);
        self.tags.swap(a, b);
        self.images.swap(a, b);
    }

    /// Copy the storage behind `kind` from `src` into `self`, in place.
    fn copy_kind_from(&mut self, src: &Store, kind: ArrayKind) {
        match kind {
            ArrayKind::Types => self.types.copy_from_slice(&src.types),
            ArrayKind::Tags => self.tags.copy_from_slice(&src.tags),
            ArrayKind::Images => self.images.copy_from_slice(&src.images),
            ArrayKind::TypeMasses => {}
            _ => {
                let (block, col, width) = column_of(kind);
                let (dst, src) = match block {
                    0 => (&mut self.x, &src.x),
                    1 => (&mut self.v, &src.v),
                    _ => (&mut self.f, &src.f),
                };
                for row in 0..src.len() / ROW_STRIDE {
                    let r = row * ROW_STRIDE + col;
                    dst[r..r + width].copy_from_slice(&src[r..r + width]);
                }
            }
        }
    }

    fn raw(&self, kind: ArrayKind, space: ExecutionSpace) -> Option<RawArray> {
        let rows = self.capacity();
        let scalar = |ptr: *const c_void, dtype| RawArray {
            ptr: ptr as *mut c_void,
            rows,
            components: 1,
            row_stride: 1,
            dtype,
            space,
        };
        Some(match kind {
            ArrayKind::Types => scalar(self.types.as_ptr().cast(), ScalarType::Int32),
            ArrayKind::Tags => scalar(self.tags.as_ptr().cast(), ScalarType::TAG_INT),
            ArrayKind::Images => scalar(self.images.as_ptr().cast(), ScalarType::IMAGE_INT),
            ArrayKind::TypeMasses => return None,
            _ => {
                let (block, col, width) = column_of(kind);
                let base = match block {
                    0 => &self.x,
                    1 => &self.v,
                    _ => &self.f,
                };
                RawArray {
                    ptr: base[col..].as_ptr() as *mut c_void,
                    rows,
                    components: width,
                    row_stride: ROW_STRIDE,
                    dtype: ScalarType::Float64,
                    space,
                }
            }
        })
    }

    fn backings(&self) -> [Backing<'_>; 6] {
        [
            Backing::F64(&self.x),
            Backing::F64(&self.v),
            Backing::F64(&self.f),
            Backing::I32(&self.types),
            Backing::Tag(&self.tags),
            Backing::Image(&self.images),
        ]
    }
}

/// (block, first column, width) of a column-stored array kind.
fn column_of(kind: ArrayKind) -> (usize, usize, usize) {
    match kind {
        ArrayKind::Positions => (0, 0, 3),
        ArrayKind::PackedTypes => (0, 3, 1),
        ArrayKind::Velocities => (1, 0, 3),
        ArrayKind::ParticleMasses => (1, 3, 1),
        ArrayKind::Forces => (2, 0, 3),
        ArrayKind::Energies => (2, 3, 1),
        other => unreachable!("{other} is not column-stored"),
    }
}

enum Backing<'a> {
    F64(&'a [f64]),
    I32(&'a [i32]),
    Tag(&'a [TagInt]),
    Image(&'a [ImageInt]),
}

impl Backing<'_> {
    fn start(&self) -> usize {
        match self {
            Self::F64(s) => s.as_ptr() as usize,
            Self::I32(s) => s.as_ptr() as usize,
            Self::Tag(s) => s.as_ptr() as usize,
            Self::Image(s) => s.as_ptr() as usize,
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::F64(s) => s.len(),
            Self::I32(s) => s.len(),
            Self::Tag(s) => s.len(),
            Self::Image(s) => s.len(),
        }
    }

    fn elem(&self) -> usize {
        match self {
            Self::F64(_) => 8,
            Self::I32(_) => 4,
            Self::Tag(_) => std::mem::size_of::<TagInt>(),
            Self::Image(_) => std::mem::size_of::<ImageInt>(),
        }
    }

    fn contains(&self, addr: usize) -> bool {
        addr >= self.start() && addr < self.start() + self.len() * self.elem()
    }

    fn push(&self, i: usize, out: &mut Vec<u8>) {
        match self {
            Self::F64(s) => out.extend_from_slice(&s[i].to_ne_bytes()),
            Self::I32(s) => out.extend_from_slice(&s[i].to_ne_bytes()),
            Self::Tag(s) => out.extend_from_slice(&s[i].to_ne_bytes()),
            Self::Image(s) => out.extend_from_slice(&s[i].to_ne_bytes()),
        }
    }
}

/// Element offsets of a strided region, in row-major order.
pub fn strided_offsets(shape: &[i64], strides: &[i64]) -> Vec<i64> {
    let mut out = vec![0i64];
    for (&extent, &stride) in shape.iter().zip(strides) {
        out = out
            .into_iter()
            .flat_map(|base| (0..extent).map(move |k| base + k * stride))
            .collect();
    }
    out
}

/// Packed buffer returned by [`MockEngine`]'s transfer hook.
#[derive(Debug)]
pub struct MockBuffer {
    words: Vec<u64>,
    len: usize,
    space: ExecutionSpace,
}

impl MockBuffer {
    pub fn from_bytes(bytes: &[u8], space: ExecutionSpace) -> Self {
        let words = bytes
            .chunks(8)
            .map(|chunk| {
                let mut w = [0u8; 8];
                w[..chunk.len()].copy_from_slice(chunk);
                u64::from_ne_bytes(w)
            })
            .collect();
        Self {
            words,
            len: bytes.len(),
            space,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes: Vec<u8> = self.words.iter().flat_map(|w| w.to_ne_bytes()).collect();
        bytes.truncate(self.len);
        bytes
    }
}

impl OwnedBuffer for MockBuffer {
    fn as_mut_ptr(&mut self) -> *mut c_void {
        self.words.as_mut_ptr().cast()
    }

    fn len_bytes(&self) -> usize {
        self.len
    }

    fn space(&self) -> ExecutionSpace {
        self.space
    }
}

/// In-memory particle engine.
///
/// Particle `i` starts with tag `i + 1`, position `(t, 10t, 100t)`,
/// velocity `(0.1t, 0.2t, 0.3t)`, force `(-t, -2t, -3t)`, energy `0.01t`
/// and type `t % ntypes + 1`, where `t` is its tag.
#[derive(Debug)]
pub struct MockEngine {
    nlocal: usize,
    ntypes: usize,
    host: Store,
    device: Option<Store>,
    type_masses: Vec<f64>,
    accelerator: Option<Accelerator>,
    generation: Generation,
    timestep: TimeStep,
    modified: [Option<ExecutionSpace>; ArrayKind::COUNT],
    sync_log: Vec<(ExecutionSpace, ArrayKind)>,
    modified_log: Vec<(ExecutionSpace, ArrayKind)>,
    registered: IndexMap<String, u32>,
    fail_transfers: bool,
    transfers: Cell<usize>,
}

impl MockEngine {
    /// Host-only engine with `nlocal` particles of `ntypes` types.
    pub fn new(nlocal: usize, ntypes: usize) -> Self {
        Self {
            nlocal,
            ntypes,
            host: Store::seeded(nlocal, ntypes, 1),
            device: None,
            type_masses: (0..=ntypes).map(|t| t as f64).collect(),
            accelerator: None,
            generation: Generation(1),
            timestep: TimeStep(0),
            modified: [None; ArrayKind::COUNT],
            sync_log: Vec::new(),
            modified_log: Vec::new(),
            registered: IndexMap::new(),
            fail_transfers: false,
            transfers: Cell::new(0),
        }
    }

    /// Add a CUDA device mirror on device `device_id`.
    pub fn with_device(mut self, device_id: i32) -> Self {
        self.device = Some(self.host.clone());
        self.accelerator = Some(Accelerator {
            kind: AcceleratorKind::Cuda,
            device_id,
        });
        self
    }

    /// Report an accelerator but keep no device mirror, so every device
    /// request has to be served by a transfer.
    pub fn with_accelerator_only(mut self, kind: AcceleratorKind, device_id: i32) -> Self {
        self.accelerator = Some(Accelerator { kind, device_id });
        self
    }

    /// Drop the accelerator and its mirror, as after a backend
    /// reconfiguration. Bumps the generation.
    pub fn remove_accelerator(&mut self) {
        self.accelerator = None;
        self.device = None;
        self.generation = self.generation.next();
    }

    /// Make every transfer fail.
    pub fn fail_transfers(&mut self, fail: bool) {
        self.fail_transfers = fail;
    }

    /// Tags of local particles in storage order.
    pub fn tags(&self) -> Vec<Tag> {
        self.host.tags[..self.nlocal].iter().map(|&t| Tag(t)).collect()
    }

    /// Host coordinates in storage order.
    pub fn positions(&self) -> Vec<[f64; 3]> {
        self.rows(&self.host.x)
    }

    /// Host forces in storage order.
    pub fn forces(&self) -> Vec<[f64; 3]> {
        self.rows(&self.host.f)
    }

    fn rows(&self, block: &[f64]) -> Vec<[f64; 3]> {
        block
            .chunks(ROW_STRIDE)
            .take(self.nlocal)
            .map(|r| [r[0], r[1], r[2]])
            .collect()
    }

    /// Overwrite one host force row.
    pub fn set_force(&mut self, slot: usize, force: [f64; 3]) {
        let r = slot * ROW_STRIDE;
        self.host.f[r..r + 3].copy_from_slice(&force);
        self.modified[ArrayKind::Forces as usize] = Some(ExecutionSpace::Host);
    }

    /// Advance the timestep counter.
    pub fn step_to(&mut self, timestep: i64) {
        self.timestep = TimeStep(timestep);
    }

    /// Shuffle storage order deterministically and bump the generation.
    ///
    /// Buffers are permuted in place; addresses do not change.
    pub fn reorder(&mut self, seed: u64) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        for i in (1..self.nlocal).rev() {
            let j = (rng.next_u64() % (i as u64 + 1)) as usize;
            self.host.swap_rows(i, j);
            if let Some(device) = self.device.as_mut() {
                device.swap_rows(i, j);
            }
        }
        self.generation = self.generation.next();
    }

    /// Reallocate for `nlocal` particles, keeping existing rows and tagging
    /// new ones after the current maximum. Bumps the generation.
    pub fn resize(&mut self, nlocal: usize) {
        let max_tag = self.host.tags[..self.nlocal].iter().copied().max().unwrap_or(0);
        let mut host = Store::zeroed(nlocal + HEADROOM);
        let keep = nlocal.min(self.nlocal);
        for i in 0..keep {
            host.fill_row(i, self.host.tags[i], self.ntypes);
        }
        for i in keep..nlocal {
            host.fill_row(i, max_tag + (i - keep) as TagInt + 1, self.ntypes);
        }
        self.device = self.device.as_ref().map(|_| host.clone());
        self.host = host;
        self.nlocal = nlocal;
        self.generation = self.generation.next();
    }

    /// Bump the generation without touching storage.
    pub fn bump_generation(&mut self) {
        self.generation = self.generation.next();
    }

    /// Reassign the tag of `slot` on the host, like `reset_atoms ids`.
    ///
    /// No uniqueness check, so tests can provoke a failing rebuild.
    pub fn set_tag(&mut self, slot: usize, tag: Tag) {
        self.host.tags[slot] = tag.0;
        self.bump_generation();
    }

    pub fn sync_log(&self) -> &[(ExecutionSpace, ArrayKind)] {
        &self.sync_log
    }

    pub fn modified_log(&self) -> &[(ExecutionSpace, ArrayKind)] {
        &self.modified_log
    }

    /// Fixes currently registered and their phase masks.
    pub fn registered_fixes(&self) -> &IndexMap<String, u32> {
        &self.registered
    }

    /// Number of transfers served so far.
    pub fn transfer_count(&self) -> usize {
        self.transfers.get()
    }

    fn store(&self, space: ExecutionSpace) -> Option<&Store> {
        match space {
            ExecutionSpace::Host => Some(&self.host),
            ExecutionSpace::Device => self.device.as_ref(),
        }
    }
}

impl ParticleEngine for MockEngine {
    fn local_particle_count(&self) -> usize {
        self.nlocal
    }

    fn global_particle_count(&self) -> u64 {
        self.nlocal as u64
    }

    fn type_count(&self) -> usize {
        self.ntypes
    }

    fn generation(&self) -> Generation {
        self.generation
    }

    fn timestep(&self) -> TimeStep {
        self.timestep
    }

    fn accelerator(&self) -> Option<Accelerator> {
        self.accelerator
    }

    fn local_tags(&self) -> &[TagInt] {
        &self.host.tags[..self.nlocal]
    }

    fn array(&self, kind: ArrayKind, space: ExecutionSpace) -> Option<RawArray> {
        if kind == ArrayKind::TypeMasses {
            // Per-type table lives on the host only.
            return (space == ExecutionSpace::Host).then(|| RawArray {
                ptr: self.type_masses.as_ptr() as *mut c_void,
                rows: self.type_masses.len(),
                components: 1,
                row_stride: 1,
                dtype: ScalarType::Float64,
                space,
            });
        }
        self.store(space)?.raw(kind, space)
    }

    fn synchronize(&mut self, space: ExecutionSpace, kinds: &[ArrayKind]) {
        for &kind in kinds {
            self.sync_log.push((space, kind));
            let stale_in = self.modified[kind as usize];
            if stale_in != Some(space.other()) {
                continue;
            }
            if let Some(device) = self.device.as_mut() {
                match space {
                    ExecutionSpace::Host => self.host.copy_kind_from(device, kind),
                    ExecutionSpace::Device => device.copy_kind_from(&self.host, kind),
                }
            }
            self.modified[kind as usize] = None;
        }
    }

    fn mark_modified(&mut self, space: ExecutionSpace, kinds: &[ArrayKind]) {
        for &kind in kinds {
            self.modified_log.push((space, kind));
            self.modified[kind as usize] = Some(space);
        }
    }

    fn transfer(
        &self,
        extent: &StridedExtent<'_>,
        from: ExecutionSpace,
        to: ExecutionSpace,
    ) -> Result<Box<dyn OwnedBuffer>, String> {
        if self.fail_transfers {
            return Err("mock transfer backend disabled".into());
        }
        if to == ExecutionSpace::Device && self.accelerator.is_none() {
            return Err("no device to transfer to".into());
        }
        self.transfers.set(self.transfers.get() + 1);
        if extent.element_count() == 0 {
            return Ok(Box::new(MockBuffer::from_bytes(&[], to)));
        }

        let addr = extent.ptr as usize + extent.byte_offset as usize;
        let mut candidates: Vec<Backing<'_>> = Vec::new();
        if let Some(store) = self.store(from) {
            candidates.extend(store.backings());
        }
        if from == ExecutionSpace::Host {
            candidates.push(Backing::F64(&self.type_masses));
        }
        let backing = candidates
            .into_iter()
            .find(|b| b.contains(addr))
            .ok_or_else(|| format!("address {addr:#x} is not engine memory on {from}"))?;

        let base = ((addr - backing.start()) / backing.elem()) as i64;
        let mut bytes = Vec::with_capacity(extent.packed_bytes());
        for offset in strided_offsets(extent.shape, extent.strides) {
            let i = base + offset;
            if i < 0 || i as usize >= backing.len() {
                return Err(format!("element {i} outside the source buffer"));
            }
            backing.push(i as usize, &mut bytes);
        }
        Ok(Box::new(MockBuffer::from_bytes(&bytes, to)))
    }
}

impl StepPipeline for MockEngine {
    fn register_fix(&mut self, id: &str, mask: u32) {
        self.registered.insert(id.to_owned(), mask);
    }

    fn unregister_fix(&mut self, id: &str) {
        self.registered.shift_remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_rows_follow_tags() {
        let e = MockEngine::new(3, 2);
        assert_eq!(e.tags(), vec![Tag(1), Tag(2), Tag(3)]);
        assert_eq!(e.positions()[1], [2.0, 20.0, 200.0]);
        assert_eq!(e.forces()[2], [-3.0, -6.0, -9.0]);
    }

    #[test]
    fn reorder_permutes_rows_together() {
        let mut e = MockEngine::new(16, 2);
        let g = e.generation();
        e.reorder(3);
        assert_eq!(e.generation(), g.next());
        let tags = e.tags();
        let mut sorted = tags.clone();
        sorted.sort();
        assert_eq!(sorted, (1..=16).map(Tag).collect::<Vec<_>>());
        assert_ne!(tags, sorted);
        for (tag, pos) in tags.iter().zip(e.positions()) {
            assert_eq!(pos[0], tag.0 as f64);
        }
    }

    #[test]
    fn resize_moves_buffers_and_adds_tags() {
        let mut e = MockEngine::new(2, 1);
        let before = e.array(ArrayKind::Positions, ExecutionSpace::Host).unwrap();
        e.resize(4);
        let after = e.array(ArrayKind::Positions, ExecutionSpace::Host).unwrap();
        assert_ne!(before.ptr, after.ptr);
        assert_eq!(e.tags(), vec![Tag(1), Tag(2), Tag(3), Tag(4)]);
        assert_eq!(after.rows, 4 + HEADROOM);
    }

    #[test]
    fn companion_columns_are_adjacent() {
        let e = MockEngine::new(2, 1);
        let x = e.array(ArrayKind::Positions, ExecutionSpace::Host).unwrap();
        let ty = e.array(ArrayKind::PackedTypes, ExecutionSpace::Host).unwrap();
        assert_eq!(ty.ptr, x.offset_ptr(3));
    }

    #[test]
    fn device_sync_copies_modified_host_columns() {
        let mut e = MockEngine::new(2, 1).with_device(0);
        e.set_force(0, [7.0, 8.0, 9.0]);
        e.synchronize(ExecutionSpace::Device, &[ArrayKind::Forces]);
        let dev = e.device.as_ref().unwrap();
        assert_eq!(&dev.f[0..3], &[7.0, 8.0, 9.0]);
        assert_eq!(e.sync_log(), &[(ExecutionSpace::Device, ArrayKind::Forces)]);
    }

    #[test]
    fn transfer_gathers_strided_rows() {
        let e = MockEngine::new(3, 1).with_device(0);
        let x = e.array(ArrayKind::Positions, ExecutionSpace::Host).unwrap();
        let shape = [3, 3];
        let strides = [ROW_STRIDE as i64, 1];
        let extent = StridedExtent {
            ptr: x.ptr.cast_const(),
            byte_offset: 0,
            shape: &shape,
            strides: &strides,
            dtype: ScalarType::Float64,
        };
        let buf = e
            .transfer(&extent, ExecutionSpace::Host, ExecutionSpace::Device)
            .unwrap();
        assert_eq!(buf.len_bytes(), 9 * 8);
        assert_eq!(buf.space(), ExecutionSpace::Device);
        assert_eq!(e.transfer_count(), 1);
    }

    #[test]
    fn strided_offsets_row_major() {
        assert_eq!(strided_offsets(&[2, 3], &[4, 1]), vec![0, 1, 2, 4, 5, 6]);
        assert_eq!(strided_offsets(&[3], &[2]), vec![0, 2, 4]);
        assert!(strided_offsets(&[0, 3], &[4, 1]).is_empty());
    }

    #[test]
    fn pipeline_registration() {
        let mut e = MockEngine::new(1, 1);
        e.register_fix("dl", 8);
        assert_eq!(e.registered_fixes().get("dl"), Some(&8));
        e.unregister_fix("dl");
        assert!(e.registered_fixes().is_empty());
    }
}
