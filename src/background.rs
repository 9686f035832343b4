//! Background acquisition by exponential running average.
//!
//! The first frame seeds a floating-point accumulator; each later frame is
//! blended in as `acc = acc * (1 - decay) + frame * decay`. Once the
//! configured number of frames has been seen the accumulator is rounded
//! back to 8-bit and frozen as the [`Background`].
//!
//! Accumulation failures never reach the caller: the estimator snapshots
//! the frame it was given and reports the capture as complete.

use image::RgbImage;
use ndarray::{Array3, ArrayView3};

use crate::error::CloakError;
use crate::types::Dimensions;

/// How a [`Background`] was produced.
#[derive(Debug, Clone, PartialEq)]
pub enum BackgroundOrigin {
    /// Running average over the capture run.
    Averaged,
    /// Raw snapshot of the last frame after accumulation failed.
    Fallback(CloakError),
}

/// Immutable background snapshot used while the cloak is active.
#[derive(Debug, Clone, PartialEq)]
pub struct Background {
    image: RgbImage,
    frames: u32,
    origin: BackgroundOrigin,
}

impl Background {
    #[must_use]
    pub const fn image(&self) -> &RgbImage {
        &self.image
    }

    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::of(&self.image)
    }

    /// Frames seen before the background was frozen.
    #[must_use]
    pub const fn frames(&self) -> u32 {
        self.frames
    }

    #[must_use]
    pub const fn origin(&self) -> &BackgroundOrigin {
        &self.origin
    }

    #[must_use]
    pub fn into_image(self) -> RgbImage {
        self.image
    }
}

/// Result of feeding one frame to the estimator.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureProgress {
    /// More frames are needed.
    Pending { captured: u32, needed: u32 },
    /// The background is ready.
    Ready(Background),
}

/// Running-average background estimator.
#[derive(Debug, Clone)]
pub struct BackgroundEstimator {
    threshold: u32,
    decay: f32,
    captured: u32,
    dimensions: Option<Dimensions>,
    accumulator: Option<Array3<f32>>,
}

impl BackgroundEstimator {
    /// `threshold` is clamped to at least one frame.
    #[must_use]
    pub fn new(threshold: u32, decay: f32) -> Self {
        Self {
            threshold: threshold.max(1),
            decay,
            captured: 0,
            dimensions: None,
            accumulator: None,
        }
    }

    #[must_use]
    pub const fn captured(&self) -> u32 {
        self.captured
    }

    #[must_use]
    pub const fn needed(&self) -> u32 {
        self.threshold
    }

    /// Size fixed by the first accepted frame.
    #[must_use]
    pub const fn dimensions(&self) -> Option<Dimensions> {
        self.dimensions
    }

    /// Current running average, laid out as `(height, width, channel)`.
    #[must_use]
    pub const fn accumulator(&self) -> Option<&Array3<f32>> {
        self.accumulator.as_ref()
    }

    /// Capture completion in `[0, 1]`.
    #[must_use]
    pub fn progress(&self) -> f32 {
        (self.captured as f32 / self.threshold as f32).min(1.0)
    }

    /// Feed one frame into the running average.
    ///
    /// # Errors
    ///
    /// Returns [`CloakError::EmptyFrame`] for a zero-area frame and
    /// [`CloakError::DimensionMismatch`] when the frame size differs from
    /// the first frame. Neither alters the estimator.
    pub fn update(&mut self, frame: &RgbImage) -> Result<CaptureProgress, CloakError> {
        let _span = tracing::debug_span!("background_update", frame = self.captured + 1).entered();

        let dims = Dimensions::of(frame);
        if dims.is_empty() {
            return Err(CloakError::EmptyFrame);
        }
        if let Some(expected) = self.dimensions {
            if expected != dims {
                return Err(CloakError::DimensionMismatch {
                    expected,
                    actual: dims,
                });
            }
        }

        self.dimensions = Some(dims);
        self.captured += 1;

        if let Err(cause) = self.accumulate(frame) {
            return Ok(CaptureProgress::Ready(self.fallback(frame, cause)));
        }

        if self.captured < self.threshold {
            return Ok(CaptureProgress::Pending {
                captured: self.captured,
                needed: self.threshold,
            });
        }

        match self.finalize() {
            Ok(image) => Ok(CaptureProgress::Ready(Background {
                image,
                frames: self.captured,
                origin: BackgroundOrigin::Averaged,
            })),
            Err(cause) => Ok(CaptureProgress::Ready(self.fallback(frame, cause))),
        }
    }

    fn accumulate(&mut self, frame: &RgbImage) -> Result<(), CloakError> {
        let (width, height) = frame.dimensions();
        let shape = (height as usize, width as usize, 3);
        let view = ArrayView3::from_shape(shape, frame.as_raw().as_slice())
            .map_err(|e| CloakError::AccumulationFailure(e.to_string()))?;

        match self.accumulator.as_mut() {
            None => {
                let mut values = Vec::new();
                values
                    .try_reserve_exact(view.len())
                    .map_err(|e| CloakError::AccumulationFailure(e.to_string()))?;
                values.extend(view.iter().map(|&p| f32::from(p)));
                let seeded = Array3::from_shape_vec(shape, values)
                    .map_err(|e| CloakError::AccumulationFailure(e.to_string()))?;
                self.accumulator = Some(seeded);
            }
            Some(acc) => {
                let keep = 1.0 - self.decay;
                let decay = self.decay;
                acc.zip_mut_with(&view, |a, &p| *a = (*a).mul_add(keep, f32::from(p) * decay));
            }
        }
        Ok(())
    }

    /// Round the accumulator back to 8-bit pixels and release it.
    fn finalize(&mut self) -> Result<RgbImage, CloakError> {
        let acc = self
            .accumulator
            .take()
            .ok_or_else(|| CloakError::AccumulationFailure("accumulator is empty".to_string()))?;

        if acc.iter().any(|v| !v.is_finite()) {
            return Err(CloakError::AccumulationFailure(
                "accumulator holds non-finite values".to_string(),
            ));
        }

        let (height, width, _) = acc.dim();
        let pixels: Vec<u8> = acc
            .iter()
            .map(|v| v.round().clamp(0.0, 255.0) as u8)
            .collect();
        RgbImage::from_raw(width as u32, height as u32, pixels).ok_or_else(|| {
            CloakError::AccumulationFailure("accumulator shape does not match frame".to_string())
        })
    }

    fn fallback(&mut self, frame: &RgbImage, cause: CloakError) -> Background {
        self.accumulator = None;
        Background {
            image: frame.clone(),
            frames: self.captured,
            origin: BackgroundOrigin::Fallback(cause),
        }
    }

    /// Corrupt the accumulator so the next finalisation fails.
    #[cfg(test)]
    pub(crate) fn poison(&mut self) {
        if let Some(acc) = self.accumulator.as_mut() {
            acc.fill(f32::NAN);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, rgb: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(width, height, image::Rgb(rgb))
    }

    #[test]
    fn first_frame_seeds_accumulator() {
        let mut est = BackgroundEstimator::new(10, 0.05);
        let progress = est.update(&solid(4, 3, [10, 20, 30])).ok();
        assert_eq!(
            progress,
            Some(CaptureProgress::Pending {
                captured: 1,
                needed: 10
            })
        );
        let acc = est.accumulator().map(|a| a.to_owned());
        let acc = acc.unwrap_or_default();
        assert_eq!(acc.dim(), (3, 4, 3));
        assert!((acc[[2, 3, 0]] - 10.0).abs() < f32::EPSILON);
        assert!((acc[[0, 0, 2]] - 30.0).abs() < f32::EPSILON);
    }

    #[test]
    fn single_frame_threshold_is_ready_immediately() {
        let mut est = BackgroundEstimator::new(1, 0.05);
        let frame = solid(2, 2, [1, 2, 3]);
        match est.update(&frame) {
            Ok(CaptureProgress::Ready(bg)) => {
                assert_eq!(bg.image(), &frame);
                assert_eq!(bg.frames(), 1);
                assert_eq!(bg.origin(), &BackgroundOrigin::Averaged);
            }
            other => panic!("expected ready background, got {other:?}"),
        }
    }

    #[test]
    fn update_applies_exponential_smoothing() {
        let mut est = BackgroundEstimator::new(10, 0.05);
        assert!(est.update(&solid(1, 1, [0, 0, 0])).is_ok());
        assert!(est.update(&solid(1, 1, [100, 200, 255])).is_ok());
        let acc = est.accumulator().map(|a| a.to_owned()).unwrap_or_default();
        assert!((acc[[0, 0, 0]] - 5.0).abs() < 1e-4);
        assert!((acc[[0, 0, 1]] - 10.0).abs() < 1e-4);
        assert!((acc[[0, 0, 2]] - 12.75).abs() < 1e-4);
    }

    #[test]
    fn constant_input_converges_monotonically() {
        let mut est = BackgroundEstimator::new(200, 0.05);
        assert!(est.update(&solid(2, 2, [0, 0, 0])).is_ok());

        let target = 200.0_f32;
        let mut last_gap = f32::INFINITY;
        for _ in 0..100 {
            assert!(est.update(&solid(2, 2, [200, 200, 200])).is_ok());
            let acc = est.accumulator().map(|a| a.to_owned()).unwrap_or_default();
            let gap = (target - acc[[1, 1, 1]]).abs();
            assert!(gap < last_gap, "gap grew from {last_gap} to {gap}");
            last_gap = gap;
        }
        assert!(last_gap < 200.0 * 0.95_f32.powi(99) + 1e-2);
    }

    #[test]
    fn ready_exactly_at_threshold() {
        let mut est = BackgroundEstimator::new(5, 0.05);
        let frame = solid(3, 3, [90, 90, 90]);
        for i in 1..5 {
            assert_eq!(
                est.update(&frame).ok(),
                Some(CaptureProgress::Pending {
                    captured: i,
                    needed: 5
                })
            );
        }
        match est.update(&frame) {
            Ok(CaptureProgress::Ready(bg)) => {
                assert_eq!(bg.frames(), 5);
                assert_eq!(bg.image(), &frame);
            }
            other => panic!("expected ready background, got {other:?}"),
        }
        assert!(est.accumulator().is_none());
    }

    #[test]
    fn mismatched_frame_is_rejected_without_side_effects() {
        let mut est = BackgroundEstimator::new(5, 0.05);
        assert!(est.update(&solid(4, 4, [1, 1, 1])).is_ok());
        let result = est.update(&solid(5, 4, [1, 1, 1]));
        assert_eq!(
            result,
            Err(CloakError::DimensionMismatch {
                expected: Dimensions::new(4, 4),
                actual: Dimensions::new(5, 4),
            })
        );
        assert_eq!(est.captured(), 1);
    }

    #[test]
    fn empty_frame_is_rejected() {
        let mut est = BackgroundEstimator::new(5, 0.05);
        assert_eq!(est.update(&RgbImage::new(0, 0)), Err(CloakError::EmptyFrame));
        assert_eq!(est.captured(), 0);
        assert_eq!(est.dimensions(), None);
    }

    #[test]
    fn corrupted_accumulator_falls_back_to_raw_frame() {
        let mut est = BackgroundEstimator::new(3, 0.05);
        assert!(est.update(&solid(2, 2, [10, 10, 10])).is_ok());
        est.poison();
        assert!(est.update(&solid(2, 2, [20, 20, 20])).is_ok());

        let last = solid(2, 2, [30, 30, 30]);
        match est.update(&last) {
            Ok(CaptureProgress::Ready(bg)) => {
                assert_eq!(bg.image(), &last);
                assert!(matches!(
                    bg.origin(),
                    BackgroundOrigin::Fallback(CloakError::AccumulationFailure(_))
                ));
            }
            other => panic!("expected fallback background, got {other:?}"),
        }
    }

    #[test]
    fn progress_is_capped_at_one() {
        let mut est = BackgroundEstimator::new(2, 0.5);
        assert!(est.progress().abs() < f32::EPSILON);
        assert!(est.update(&solid(1, 1, [0, 0, 0])).is_ok());
        assert!((est.progress() - 0.5).abs() < f32::EPSILON);
        assert!(est.update(&solid(1, 1, [0, 0, 0])).is_ok());
        assert!((est.progress() - 1.0).abs() < f32::EPSILON);
    }
}
