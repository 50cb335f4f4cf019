//! Periodic image-flag codec.
//!
//! The engine stores how many times each particle crossed each periodic
//! boundary in a single integer. Each axis gets a block of [`IMG_BITS`]
//! bits, axis 0 in the low bits, axis 1 in the next block and axis 2 above
//! that. Offsets are stored biased by [`IMG_MAX`], so the encoded value is
//! unsigned per axis and the range `-IMG_MAX ..= IMG_MAX - 1` round-trips
//! exactly.

use crate::error::DlextError;
use crate::id::ImageInt;

/// Bits per axis.
#[cfg(not(feature = "bigbig"))]
pub const IMG_BITS: u32 = 10;
/// Bits per axis.
#[cfg(feature = "bigbig")]
pub const IMG_BITS: u32 = 21;

/// Bits occupied by two axes; the shift of axis 2.
pub const IMG2_BITS: u32 = 2 * IMG_BITS;

/// Mask selecting one axis after shifting.
pub const IMG_MASK: ImageInt = (1 << IMG_BITS) - 1;

/// Bias added to every offset before packing. Also the magnitude of the
/// most negative representable offset.
pub const IMG_MAX: ImageInt = 1 << (IMG_BITS - 1);

/// Width of the whole packed field in bits.
pub const IMG_BIT_SIZE: u32 = ImageInt::BITS;

/// Pack three per-axis image offsets into one image flag.
///
/// Fails with [`DlextError::ImageOffsetOverflow`] naming the first axis
/// whose offset lies outside `-IMG_MAX ..= IMG_MAX - 1`.
pub fn pack(ix: ImageInt, iy: ImageInt, iz: ImageInt) -> Result<ImageInt, DlextError> {
    let mut biased = [0; 3];
    for (axis, (slot, value)) in biased.iter_mut().zip([ix, iy, iz]).enumerate() {
        if !(-IMG_MAX..IMG_MAX).contains(&value) {
            return Err(DlextError::ImageOffsetOverflow {
                axis,
                value: value as i64,
            });
        }
        *slot = value + IMG_MAX;
    }
    Ok((biased[2] << IMG2_BITS) | (biased[1] << IMG_BITS) | biased[0])
}

/// Unpack an image flag into its three per-axis offsets.
pub fn unpack(image: ImageInt) -> (ImageInt, ImageInt, ImageInt) {
    let ix = (image & IMG_MASK) - IMG_MAX;
    let iy = ((image >> IMG_BITS) & IMG_MASK) - IMG_MAX;
    let iz = ((image >> IMG2_BITS) & IMG_MASK) - IMG_MAX;
    (ix, iy, iz)
}

/// Unpack a whole image array.
pub fn unpack_all(images: &[ImageInt]) -> Vec<[ImageInt; 3]> {
    images
        .iter()
        .map(|&img| {
            let (x, y, z) = unpack(img);
            [x, y, z]
        })
        .collect()
}

/// Reconstruct the unwrapped coordinate of a particle.
///
/// `position` is the wrapped coordinate inside the primary box and
/// `box_lengths` the periodic box edge lengths (orthogonal boxes only).
pub fn unwrap_position(position: [f64; 3], image: ImageInt, box_lengths: [f64; 3]) -> [f64; 3] {
    let (ix, iy, iz) = unpack(image);
    [
        position[0] + ix as f64 * box_lengths[0],
        position[1] + iy as f64 * box_lengths[1],
        position[2] + iz as f64 * box_lengths[2],
    ]
}
