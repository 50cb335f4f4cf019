//! Packed host buffers and strided host gathers.

use std::ffi::c_void;
use std::ptr;

use dlext_core::{ExecutionSpace, OwnedBuffer, ScalarType, StridedExtent};

/// A Rust scalar that matches one engine element type.
pub trait Element: Copy + Send + 'static + sealed::Sealed {
    /// The engine element type this scalar reads as.
    const DTYPE: ScalarType;
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for f32 {}
    impl Sealed for f64 {}
    impl Sealed for i32 {}
    impl Sealed for i64 {}
    impl Sealed for u32 {}
}

impl Element for f32 {
    const DTYPE: ScalarType = ScalarType::Float32;
}
impl Element for f64 {
    const DTYPE: ScalarType = ScalarType::Float64;
}
impl Element for i32 {
    const DTYPE: ScalarType = ScalarType::Int32;
}
impl Element for i64 {
    const DTYPE: ScalarType = ScalarType::Int64;
}
impl Element for u32 {
    const DTYPE: ScalarType = ScalarType::UInt32;
}

/// A zero-initialized, 8-byte aligned host allocation.
#[derive(Debug)]
pub struct HostBuffer {
    words: Vec<u64>,
    len: usize,
}

impl HostBuffer {
    /// `len` zero bytes.
    pub fn zeroed(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(8)],
            len,
        }
    }

    /// Start of the buffer.
    pub fn as_ptr(&self) -> *const u8 {
        self.words.as_ptr().cast()
    }

    /// Reinterpret the contents as `T`s.
    ///
    /// Trailing bytes that do not fill a whole `T` are ignored.
    #[allow(unsafe_code)]
    pub fn to_vec<T: Element>(&self) -> Vec<T> {
        let n = self.len / std::mem::size_of::<T>();
        (0..n)
            .map(|i| {
                // SAFETY: `i < n` keeps the read inside `len` bytes. The
                // buffer is 8-byte aligned and every `Element` is a plain
                // scalar valid for any bit pattern.
                unsafe { ptr::read(self.as_ptr().cast::<T>().add(i)) }
            })
            .collect()
    }
}

impl OwnedBuffer for HostBuffer {
    fn as_mut_ptr(&mut self) -> *mut c_void {
        self.words.as_mut_ptr().cast()
    }

    fn len_bytes(&self) -> usize {
        self.len
    }

    fn space(&self) -> ExecutionSpace {
        ExecutionSpace::Host
    }
}

/// Element offsets of a strided region, in row-major order.
pub fn row_major_offsets(shape: &[i64], strides: &[i64]) -> Vec<i64> {
    let mut out = vec![0i64];
    for (&extent, &stride) in shape.iter().zip(strides) {
        let mut next = Vec::with_capacity(out.len() * extent.max(0) as usize);
        for &base in &out {
            next.extend((0..extent).map(|k| base + k * stride));
        }
        out = next;
    }
    out
}

/// Compact row-major strides for `shape`.
pub fn packed_strides(shape: &[i64]) -> Vec<i64> {
    let mut strides = vec![1i64; shape.len()];
    for d in (0..shape.len().saturating_sub(1)).rev() {
        strides[d] = strides[d + 1] * shape[d + 1];
    }
    strides
}

/// Gather a strided host region into a packed buffer.
///
/// # Safety
///
/// `extent` must describe host memory that is readable at every element
/// it addresses and not concurrently written.
#[allow(unsafe_code)]
pub unsafe fn gather_host(extent: &StridedExtent<'_>) -> HostBuffer {
    let elem = extent.dtype.size_bytes();
    let mut out = HostBuffer::zeroed(extent.packed_bytes());
    let dst = out.as_mut_ptr().cast::<u8>();
    let base = extent.ptr.cast::<u8>().wrapping_add(extent.byte_offset as usize);
    for (k, offset) in row_major_offsets(extent.shape, extent.strides)
        .into_iter()
        .enumerate()
    {
        let src = base.wrapping_offset(offset as isize * elem as isize);
        // SAFETY: the caller guarantees `src` is readable for `elem` bytes;
        // `k < element_count` keeps the write inside `out`.
        unsafe { ptr::copy_nonoverlapping(src, dst.add(k * elem), elem) };
    }
    out
}

/// Scatter packed row-major `values` into a strided host region.
///
/// # Safety
///
/// `extent` must describe host memory that is writable at every element
/// it addresses, with element type `T`, and not concurrently accessed.
#[allow(unsafe_code)]
pub unsafe fn scatter_host<T: Element>(extent: &StridedExtent<'_>, values: &[T]) {
    let base = extent
        .ptr
        .cast::<u8>()
        .wrapping_add(extent.byte_offset as usize)
        .cast::<T>()
        .cast_mut();
    for (offset, value) in row_major_offsets(extent.shape, extent.strides)
        .into_iter()
        .zip(values)
    {
        // SAFETY: forwarded to the caller.
        unsafe { ptr::write(base.wrapping_offset(offset as isize), *value) };
    }
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;

    #[test]
    fn offsets_follow_row_major_order() {
        assert_eq!(row_major_offsets(&[2, 3], &[4, 1]), vec![0, 1, 2, 4, 5, 6]);
        assert_eq!(row_major_offsets(&[3], &[4]), vec![0, 4, 8]);
        assert!(row_major_offsets(&[0, 4], &[4, 1]).is_empty());
    }

    #[test]
    fn packed_strides_are_row_major() {
        assert_eq!(packed_strides(&[5, 4]), vec![4, 1]);
        assert_eq!(packed_strides(&[7]), vec![1]);
        assert!(packed_strides(&[]).is_empty());
    }

    #[test]
    fn gather_drops_padding_column() {
        // Three rows of xyz plus one padding column.
        let src: Vec<f64> = (0..12).map(|i| i as f64).collect();
        let shape = [3, 3];
        let strides = [4, 1];
        let extent = StridedExtent {
            ptr: src.as_ptr().cast(),
            byte_offset: 0,
            shape: &shape,
            strides: &strides,
            dtype: ScalarType::Float64,
        };
        // SAFETY: `src` covers every addressed element.
        let buf = unsafe { gather_host(&extent) };
        assert_eq!(buf.len_bytes(), 72);
        assert_eq!(
            buf.to_vec::<f64>(),
            vec![0.0, 1.0, 2.0, 4.0, 5.0, 6.0, 8.0, 9.0, 10.0]
        );
    }

    #[test]
    fn gather_honours_byte_offset() {
        let src: Vec<i32> = vec![10, 11, 12, 13];
        let shape = [2];
        let strides = [2];
        let extent = StridedExtent {
            ptr: src.as_ptr().cast(),
            byte_offset: 4,
            shape: &shape,
            strides: &strides,
            dtype: ScalarType::Int32,
        };
        // SAFETY: `src` covers every addressed element.
        let buf = unsafe { gather_host(&extent) };
        assert_eq!(buf.to_vec::<i32>(), vec![11, 13]);
    }

    #[test]
    fn scatter_writes_only_addressed_elements() {
        let mut dst = vec![0.0f64; 8];
        let shape = [2, 3];
        let strides = [4, 1];
        let extent = StridedExtent {
            ptr: dst.as_mut_ptr().cast_const().cast(),
            byte_offset: 0,
            shape: &shape,
            strides: &strides,
            dtype: ScalarType::Float64,
        };
        // SAFETY: `dst` covers every addressed element.
        unsafe { scatter_host(&extent, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]) };
        assert_eq!(dst, vec![1.0, 2.0, 3.0, 0.0, 4.0, 5.0, 6.0, 0.0]);
    }
}
