//! Resolution of a property into a concrete strided tensor layout.

use std::ffi::c_void;

use dlext_core::{
    ArrayKind, DlextError, ExecutionSpace, ParticleProperty, RawArray, ScalarType, StridedExtent,
};
use smallvec::SmallVec;

/// Pointer, shape and strides of one exposed property.
///
/// Strides are in elements. Vector properties are `[rows, components]`
/// with strides `[row_stride, 1]`; scalar properties are `[rows]` with
/// stride `[row_stride]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TensorLayout {
    /// Base address of element `[0, 0]`.
    pub ptr: *mut c_void,
    /// Offset of the first element from `ptr`, in bytes.
    pub byte_offset: u64,
    /// Extent per dimension.
    pub shape: SmallVec<[i64; 2]>,
    /// Stride per dimension, in elements.
    pub strides: SmallVec<[i64; 2]>,
    /// Element type.
    pub dtype: ScalarType,
    /// Space the memory lives in.
    pub space: ExecutionSpace,
}

impl TensorLayout {
    /// Layout of a property backed by one engine array with `rows` live rows.
    pub fn from_array(
        property: ParticleProperty,
        kind: ArrayKind,
        raw: RawArray,
        rows: usize,
    ) -> Result<Self, DlextError> {
        check_rows(property, kind, &raw, rows)?;
        if raw.components != kind.components() {
            return Err(incompatible(
                property,
                format!(
                    "array '{kind}' has {} components, expected {}",
                    raw.components,
                    kind.components()
                ),
            ));
        }
        Ok(Self::strided(raw, rows, raw.components))
    }

    /// Layout of a composite whose second array is interleaved right after
    /// the first within every row.
    pub fn from_interleaved(
        property: ParticleProperty,
        (first_kind, first): (ArrayKind, RawArray),
        (second_kind, second): (ArrayKind, RawArray),
        rows: usize,
    ) -> Result<Self, DlextError> {
        check_rows(property, first_kind, &first, rows)?;
        check_rows(property, second_kind, &second, rows)?;
        if first.space != second.space {
            return Err(incompatible(
                property,
                format!(
                    "'{first_kind}' is on {} but '{second_kind}' is on {}",
                    first.space, second.space
                ),
            ));
        }
        if first.dtype != second.dtype {
            return Err(incompatible(
                property,
                format!(
                    "'{first_kind}' is {} but '{second_kind}' is {}",
                    first.dtype, second.dtype
                ),
            ));
        }
        if first.row_stride != second.row_stride {
            return Err(incompatible(
                property,
                format!(
                    "row strides differ ({} vs {})",
                    first.row_stride, second.row_stride
                ),
            ));
        }
        if second.ptr != first.offset_ptr(first.components) {
            return Err(incompatible(
                property,
                format!("'{second_kind}' is not interleaved after '{first_kind}'"),
            ));
        }
        let components = first.components + second.components;
        if first.row_stride < components {
            return Err(incompatible(
                property,
                format!(
                    "row stride {} is narrower than {components} components",
                    first.row_stride
                ),
            ));
        }
        Ok(Self::strided(first, rows, components))
    }

    fn strided(raw: RawArray, rows: usize, components: usize) -> Self {
        let (shape, strides) = if components == 1 {
            (
                SmallVec::from_slice(&[rows as i64]),
                SmallVec::from_slice(&[raw.row_stride as i64]),
            )
        } else {
            (
                SmallVec::from_slice(&[rows as i64, components as i64]),
                SmallVec::from_slice(&[raw.row_stride as i64, 1]),
            )
        };
        Self {
            ptr: raw.ptr,
            byte_offset: 0,
            shape,
            strides,
            dtype: raw.dtype,
            space: raw.space,
        }
    }

    /// Number of tensor dimensions.
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Number of elements (product of the shape).
    pub fn element_count(&self) -> usize {
        self.shape.iter().map(|&d| d as usize).product()
    }

    /// Elements between consecutive rows.
    pub fn element_stride(&self) -> usize {
        self.strides.first().map_or(0, |&s| s as usize)
    }

    /// Rows in the leading dimension.
    pub fn rows(&self) -> usize {
        self.shape.first().map_or(0, |&d| d as usize)
    }

    /// Whether rows are packed with no gaps.
    pub fn is_contiguous(&self) -> bool {
        let inner: i64 = self.shape.iter().skip(1).product();
        self.rows() <= 1 || self.strides[0] == inner
    }

    /// Size of a packed row-major copy.
    pub fn packed_bytes(&self) -> usize {
        self.element_count() * self.dtype.size_bytes()
    }

    /// The region as a transfer request.
    pub fn extent(&self) -> StridedExtent<'_> {
        StridedExtent {
            ptr: self.ptr.cast_const(),
            byte_offset: self.byte_offset,
            shape: &self.shape,
            strides: &self.strides,
            dtype: self.dtype,
        }
    }
}

fn check_rows(
    property: ParticleProperty,
    kind: ArrayKind,
    raw: &RawArray,
    rows: usize,
) -> Result<(), DlextError> {
    if raw.rows < rows {
        return Err(incompatible(
            property,
            format!("array '{kind}' holds {} rows, need {rows}", raw.rows),
        ));
    }
    if raw.row_stride < raw.components {
        return Err(incompatible(
            property,
            format!(
                "array '{kind}' row stride {} is below its {} components",
                raw.row_stride, raw.components
            ),
        ));
    }
    Ok(())
}

fn incompatible(property: ParticleProperty, reason: String) -> DlextError {
    DlextError::IncompatibleLayout { property, reason }
}
