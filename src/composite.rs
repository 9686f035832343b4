//! Weighted blend of the live frame and the captured background.

use image::{Rgb, RgbImage};

use crate::error::CloakError;
use crate::segment::MASK_MAX;
use crate::types::{Dimensions, Mask};

/// Blend `frame` toward `background` by the per-pixel weight `mask / 255`.
///
/// Each output channel is `frame * (1 - w) + background * w`, computed in
/// `f32` and rounded to the nearest 8-bit value.
///
/// # Errors
///
/// Returns [`CloakError::EmptyFrame`] for a zero-area frame and
/// [`CloakError::DimensionMismatch`] if the background or mask differ in
/// size from the frame.
pub fn blend(frame: &RgbImage, background: &RgbImage, mask: &Mask) -> Result<RgbImage, CloakError> {
    let _span = tracing::debug_span!("blend").entered();

    let dims = Dimensions::of(frame);
    if dims.is_empty() {
        return Err(CloakError::EmptyFrame);
    }
    let bg_dims = Dimensions::of(background);
    if bg_dims != dims {
        return Err(CloakError::DimensionMismatch {
            expected: bg_dims,
            actual: dims,
        });
    }
    let mask_dims = Dimensions::new(mask.width(), mask.height());
    if mask_dims != dims {
        return Err(CloakError::DimensionMismatch {
            expected: dims,
            actual: mask_dims,
        });
    }

    let scale = f32::from(MASK_MAX);
    Ok(RgbImage::from_fn(dims.width, dims.height, |x, y| {
        let w = (mask.get_pixel(x, y).0[0] / scale).clamp(0.0, 1.0);
        let fg = frame.get_pixel(x, y).0;
        let bg = background.get_pixel(x, y).0;
        Rgb(std::array::from_fn(|c| {
            let value = f32::from(bg[c]).mul_add(w, f32::from(fg[c]) * (1.0 - w));
            value.round().clamp(0.0, 255.0) as u8
        }))
    }))
}
