//! Colour segmentation: which pixels of a frame belong to the cloak.
//!
//! 1. Convert each pixel to 8-bit HSV and keep those inside the target
//!    range (255) or not (0).
//! 2. Morphological opening removes isolated matches.
//! 3. Morphological closing fills small holes inside matching regions.
//! 4. A separable Gaussian softens the mask boundary.
//!
//! Opening runs before closing; swapping them changes the result on noisy
//! masks. `k` iterations of a 3x3 square element equal a single pass at
//! Chebyshev radius `k`, which is what [`imageproc::morphology`] computes
//! with [`Norm::LInf`].

use image::{GrayImage, Luma, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::{filter, morphology};

use crate::config::CloakConfig;
use crate::error::CloakError;
use crate::types::{ColorRange, Hsv, Mask};

/// Mask value of a matching pixel.
pub const MASK_MAX: u8 = 255;

/// Binary mask of pixels whose HSV colour lies inside `range`.
#[must_use = "returns the thresholded mask"]
pub fn in_range(frame: &RgbImage, range: &ColorRange) -> GrayImage {
    GrayImage::from_fn(frame.width(), frame.height(), |x, y| {
        let [r, g, b] = frame.get_pixel(x, y).0;
        if range.contains(Hsv::from_rgb(r, g, b)) {
            Luma([MASK_MAX])
        } else {
            Luma([0])
        }
    })
}

/// Opening followed by closing, each with `iterations` passes of a 3x3
/// element. Zero iterations return the mask unchanged.
#[must_use = "returns the cleaned mask"]
pub fn open_close(mask: &GrayImage, iterations: u8) -> GrayImage {
    if iterations == 0 {
        return mask.clone();
    }
    let opened = morphology::open(mask, Norm::LInf, iterations);
    morphology::close(&opened, Norm::LInf, iterations)
}

/// Normalised 1-D Gaussian taps for an odd `size`.
///
/// A non-positive `sigma` is derived from the size. Sizes up to 7 with a
/// derived sigma use the fixed binomial-like tables so that a 5-tap kernel
/// is exactly `[1, 4, 6, 4, 1] / 16`.
#[must_use]
pub fn gaussian_kernel(size: u32, sigma: f32) -> Vec<f32> {
    if sigma <= 0.0 {
        match size {
            1 => return vec![1.0],
            3 => return vec![0.25, 0.5, 0.25],
            5 => return vec![0.0625, 0.25, 0.375, 0.25, 0.0625],
            7 => {
                return vec![
                    0.031_25, 0.109_375, 0.218_75, 0.281_25, 0.218_75, 0.109_375, 0.031_25,
                ]
            }
            _ => {}
        }
    }

    let sigma = if sigma > 0.0 {
        sigma
    } else {
        0.3f32.mul_add((size as f32 - 1.0).mul_add(0.5, -1.0), 0.8)
    };
    let center = (size / 2) as f32;
    let mut taps: Vec<f32> = (0..size)
        .map(|i| {
            let d = i as f32 - center;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f32 = taps.iter().sum();
    for t in &mut taps {
        *t /= sum;
    }
    taps
}

/// Separable convolution of a binary mask with `kernel` in both axes.
///
/// Edge pixels are extended outward, so a region touching the frame border
/// keeps full weight up to the border.
#[must_use = "returns the smoothed mask"]
pub fn smooth(mask: &GrayImage, kernel: &[f32]) -> Mask {
    let weights = Mask::from_fn(mask.width(), mask.height(), |x, y| {
        Luma([f32::from(mask.get_pixel(x, y).0[0])])
    });
    let mut smoothed = filter::separable_filter_equal(&weights, kernel);
    for p in smoothed.pixels_mut() {
        p.0[0] = p.0[0].clamp(0.0, f32::from(MASK_MAX));
    }
    smoothed
}

/// Stateless segmenter holding the configured range and filter sizes.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorSegmenter {
    range: ColorRange,
    iterations: u8,
    kernel: Vec<f32>,
}

impl ColorSegmenter {
    #[must_use]
    pub fn new(range: ColorRange, iterations: u8, blur_kernel_size: u32) -> Self {
        Self {
            range,
            iterations,
            kernel: gaussian_kernel(blur_kernel_size, 0.0),
        }
    }

    #[must_use]
    pub fn from_config(config: &CloakConfig) -> Self {
        Self::new(
            config.target_color_range,
            config.morphology_iterations,
            config.blur_kernel_size,
        )
    }

    #[must_use]
    pub const fn range(&self) -> &ColorRange {
        &self.range
    }

    /// Compute the smoothed target mask for `frame`.
    ///
    /// # Errors
    ///
    /// Returns [`CloakError::EmptyFrame`] for a zero-area frame.
    pub fn segment(&self, frame: &RgbImage) -> Result<Mask, CloakError> {
        let _span = tracing::debug_span!("segment").entered();

        if frame.width() == 0 || frame.height() == 0 {
            return Err(CloakError::EmptyFrame);
        }
        let raw = in_range(frame, &self.range);
        let cleaned = open_close(&raw, self.iterations);
        Ok(smooth(&cleaned, &self.kernel))
    }
}

impl Default for ColorSegmenter {
    fn default() -> Self {
        Self::from_config(&CloakConfig::default())
    }
}
