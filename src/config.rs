//! Construction-time configuration of a [`CloakPipeline`](crate::CloakPipeline).

use crate::error::CloakError;
use crate::types::ColorRange;

/// Options recognised by the pipeline.
///
/// All fields have defaults; [`CloakConfig::validate`] runs when a pipeline
/// is built, so an invalid configuration is reported before any frame is
/// processed.
#[derive(Debug, Clone, PartialEq)]
pub struct CloakConfig {
    /// Colour family replaced by the background.
    pub target_color_range: ColorRange,

    /// Frames averaged before the background is frozen.
    pub background_frame_threshold: u32,

    /// Weight of each new frame in the running average.
    pub accumulator_decay: f32,

    /// Iterations of the 3x3 opening and closing applied to the mask.
    pub morphology_iterations: u8,

    /// Side of the square Gaussian kernel that softens the mask edge.
    pub blur_kernel_size: u32,

    /// Draw the capture progress and status indicators onto output frames.
    pub overlay: bool,
}

impl CloakConfig {
    pub const DEFAULT_BACKGROUND_FRAMES: u32 = 80;
    pub const DEFAULT_DECAY: f32 = 0.05;
    pub const DEFAULT_MORPHOLOGY_ITERATIONS: u8 = 2;
    pub const DEFAULT_BLUR_KERNEL: u32 = 5;

    /// Check every option.
    ///
    /// # Errors
    ///
    /// Returns [`CloakError::InvalidConfig`] naming the first offending
    /// option.
    pub fn validate(&self) -> Result<(), CloakError> {
        self.target_color_range.validate()?;

        if self.background_frame_threshold == 0 {
            return Err(CloakError::InvalidConfig(
                "background_frame_threshold must be at least 1".to_string(),
            ));
        }
        if !self.accumulator_decay.is_finite()
            || self.accumulator_decay <= 0.0
            || self.accumulator_decay > 1.0
        {
            return Err(CloakError::InvalidConfig(format!(
                "accumulator_decay must lie in (0, 1], got {}",
                self.accumulator_decay
            )));
        }
        if self.blur_kernel_size == 0 || self.blur_kernel_size % 2 == 0 {
            return Err(CloakError::InvalidConfig(format!(
                "blur_kernel_size must be odd and positive, got {}",
                self.blur_kernel_size
            )));
        }
        Ok(())
    }
}

impl Default for CloakConfig {
    fn default() -> Self {
        Self {
            target_color_range: ColorRange::BLUE,
            background_frame_threshold: Self::DEFAULT_BACKGROUND_FRAMES,
            accumulator_decay: Self::DEFAULT_DECAY,
            morphology_iterations: Self::DEFAULT_MORPHOLOGY_ITERATIONS,
            blur_kernel_size: Self::DEFAULT_BLUR_KERNEL,
            overlay: true,
        }
    }
}
