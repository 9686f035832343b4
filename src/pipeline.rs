//! Two-phase cloak pipeline.
//!
//! A pipeline starts in [`PipelineState::Capturing`], averaging frames into
//! a background, and moves to [`PipelineState::Active`] once the background
//! is ready. While active, target-coloured pixels are replaced by the
//! background.
//!
//! [`CloakPipeline::step`] reports per-frame failures as [`CloakError`]s and
//! leaves the state untouched when it fails. [`CloakPipeline::process_frame`]
//! wraps it for streaming hosts: failures are logged and the input frame is
//! returned as-is, so a bad frame never ends the stream.
//!
//! A pipeline mutates its state on every call and must be driven by one
//! stream at a time.

use std::fmt;

use image::RgbImage;

use crate::background::{Background, BackgroundEstimator, BackgroundOrigin, CaptureProgress};
use crate::composite;
use crate::config::CloakConfig;
use crate::error::CloakError;
use crate::overlay::StatusOverlay;
use crate::segment::ColorSegmenter;
use crate::types::Dimensions;

/// What the pipeline is doing, as shown to the viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Capturing { captured: u32, needed: u32 },
    Active,
}

impl Status {
    /// Capture completion as a whole percentage.
    #[must_use]
    pub fn percent(&self) -> u32 {
        match *self {
            Self::Capturing { captured, needed } => {
                (u64::from(captured.min(needed)) * 100 / u64::from(needed.max(1))) as u32
            }
            Self::Active => 100,
        }
    }

    /// Caption lines for the overlay.
    #[must_use]
    pub fn captions(&self) -> Vec<String> {
        match self {
            Self::Capturing { .. } => vec![self.to_string(), "Stand Still!".to_string()],
            Self::Active => vec![self.to_string()],
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Capturing { .. } => write!(f, "Capturing Background: {}%", self.percent()),
            Self::Active => f.write_str("Invisibility Active!"),
        }
    }
}

/// Pipeline phase. Each variant owns exactly the data its phase needs.
#[derive(Debug, Clone)]
pub enum PipelineState {
    Capturing(BackgroundEstimator),
    Active(Background),
}

/// A successfully processed frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Processed {
    pub image: RgbImage,
    pub status: Status,
}

/// Feed one frame to the estimator. Returns the frame to show, its status,
/// and the finished background once capture completes.
///
/// # Errors
///
/// Propagates [`BackgroundEstimator::update`] errors.
pub fn capture_step(
    estimator: &mut BackgroundEstimator,
    frame: &RgbImage,
) -> Result<(Processed, Option<Background>), CloakError> {
    let (status, background) = match estimator.update(frame)? {
        CaptureProgress::Pending { captured, needed } => {
            (Status::Capturing { captured, needed }, None)
        }
        CaptureProgress::Ready(background) => (
            Status::Capturing {
                captured: background.frames(),
                needed: estimator.needed(),
            },
            Some(background),
        ),
    };
    let processed = Processed {
        image: frame.clone(),
        status,
    };
    Ok((processed, background))
}

/// Replace target-coloured pixels of `frame` with `background`.
///
/// # Errors
///
/// Returns [`CloakError::DimensionMismatch`] if the frame and background
/// differ in size, or any error from segmentation or blending.
pub fn active_step(
    segmenter: &ColorSegmenter,
    background: &Background,
    frame: &RgbImage,
) -> Result<Processed, CloakError> {
    let expected = background.dimensions();
    let actual = Dimensions::of(frame);
    if expected != actual {
        return Err(CloakError::DimensionMismatch { expected, actual });
    }
    let mask = segmenter.segment(frame)?;
    let image = composite::blend(frame, background.image(), &mask)?;
    Ok(Processed {
        image,
        status: Status::Active,
    })
}

/// Per-stream cloak effect.
#[derive(Debug, Clone)]
pub struct CloakPipeline {
    config: CloakConfig,
    segmenter: ColorSegmenter,
    state: PipelineState,
    overlay: Option<StatusOverlay>,
}

impl CloakPipeline {
    /// Build a pipeline in the capturing state.
    ///
    /// # Errors
    ///
    /// Returns [`CloakError::InvalidConfig`] if `config` fails validation.
    pub fn new(config: CloakConfig) -> Result<Self, CloakError> {
        config.validate()?;
        let overlay = config.overlay.then(StatusOverlay::new);
        Ok(Self {
            segmenter: ColorSegmenter::from_config(&config),
            state: PipelineState::Capturing(Self::estimator(&config)),
            overlay,
            config,
        })
    }

    /// Replace the status overlay, e.g. with one using another font.
    /// Ignored when the configuration disables overlays.
    #[must_use]
    pub fn with_overlay(mut self, overlay: StatusOverlay) -> Self {
        if self.config.overlay {
            self.overlay = Some(overlay);
        }
        self
    }

    fn estimator(config: &CloakConfig) -> BackgroundEstimator {
        BackgroundEstimator::new(config.background_frame_threshold, config.accumulator_decay)
    }

    #[must_use]
    pub const fn config(&self) -> &CloakConfig {
        &self.config
    }

    #[must_use]
    pub const fn state(&self) -> &PipelineState {
        &self.state
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self.state, PipelineState::Active(_))
    }

    #[must_use]
    pub const fn background(&self) -> Option<&Background> {
        match &self.state {
            PipelineState::Active(background) => Some(background),
            PipelineState::Capturing(_) => None,
        }
    }

    #[must_use]
    pub fn status(&self) -> Status {
        match &self.state {
            PipelineState::Capturing(estimator) => Status::Capturing {
                captured: estimator.captured(),
                needed: estimator.needed(),
            },
            PipelineState::Active(_) => Status::Active,
        }
    }

    /// Process one frame.
    ///
    /// # Errors
    ///
    /// Returns [`CloakError::EmptyFrame`] for a zero-area frame and
    /// [`CloakError::DimensionMismatch`] for a frame whose size differs
    /// from the stream's. The pipeline state is unchanged on error.
    pub fn step(&mut self, frame: &RgbImage) -> Result<Processed, CloakError> {
        if Dimensions::of(frame).is_empty() {
            return Err(CloakError::EmptyFrame);
        }

        let mut processed = match &mut self.state {
            PipelineState::Capturing(estimator) => {
                let (processed, background) = capture_step(estimator, frame)?;
                if let Some(background) = background {
                    self.state = PipelineState::Active(background);
                }
                processed
            }
            PipelineState::Active(background) => active_step(&self.segmenter, background, frame)?,
        };

        if let Some(overlay) = &self.overlay {
            overlay.draw(&mut processed.image, &processed.status);
        }
        Ok(processed)
    }

    /// Process one frame, passing it through unchanged on any failure.
    pub fn process_frame(&mut self, frame: RgbImage) -> RgbImage {
        let was_active = self.is_active();
        match self.step(&frame) {
            Ok(processed) => {
                if !was_active {
                    self.log_transition();
                }
                processed.image
            }
            Err(err) => {
                tracing::warn!(error = %err, "passing frame through unprocessed");
                frame
            }
        }
    }

    fn log_transition(&self) {
        let Some(background) = self.background() else {
            return;
        };
        match background.origin() {
            BackgroundOrigin::Averaged => tracing::info!(
                frames = background.frames(),
                size = %background.dimensions(),
                "Background captured"
            ),
            BackgroundOrigin::Fallback(cause) => tracing::warn!(
                frames = background.frames(),
                error = %cause,
                "Background accumulation failed, using last frame as background"
            ),
        }
    }

    /// Discard the background and start capturing a new one.
    pub fn reset_background(&mut self) {
        tracing::info!("Restarting background capture");
        self.state = PipelineState::Capturing(Self::estimator(&self.config));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use image::Rgb;

    const GRAY: Rgb<u8> = Rgb([128, 128, 128]);
    const BLUE: Rgb<u8> = Rgb([0, 0, 255]);

    fn quiet_config(threshold: u32) -> CloakConfig {
        CloakConfig {
            background_frame_threshold: threshold,
            overlay: false,
            ..CloakConfig::default()
        }
    }

    #[test]
    fn invalid_config_is_fatal() {
        let config = CloakConfig {
            blur_kernel_size: 0,
            ..CloakConfig::default()
        };
        let err = CloakPipeline::new(config).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn status_captions() {
        let capturing = Status::Capturing {
            captured: 40,
            needed: 80,
        };
        assert_eq!(capturing.to_string(), "Capturing Background: 50%");
        assert_eq!(capturing.captions().len(), 2);
        assert_eq!(Status::Active.to_string(), "Invisibility Active!");
        assert_eq!(
            Status::Capturing {
                captured: 90,
                needed: 80
            }
            .percent(),
            100
        );
    }

    #[test]
    fn capture_returns_input_unchanged() {
        let mut pipeline = CloakPipeline::new(quiet_config(3)).unwrap();
        let frame = RgbImage::from_pixel(16, 16, BLUE);
        let processed = pipeline.step(&frame).unwrap();
        assert_eq!(processed.image, frame);
        assert_eq!(
            processed.status,
            Status::Capturing {
                captured: 1,
                needed: 3
            }
        );
        assert!(!pipeline.is_active());
    }

    #[test]
    fn transitions_once_at_threshold() {
        let mut pipeline = CloakPipeline::new(quiet_config(4)).unwrap();
        let frame = RgbImage::from_pixel(16, 16, GRAY);
        for _ in 0..3 {
            pipeline.step(&frame).unwrap();
            assert!(!pipeline.is_active());
        }
        let last = pipeline.step(&frame).unwrap();
        assert_eq!(last.status.percent(), 100);
        assert!(pipeline.is_active());

        for _ in 0..3 {
            let processed = pipeline.step(&frame).unwrap();
            assert_eq!(processed.status, Status::Active);
            assert!(pipeline.is_active());
        }
        assert_eq!(pipeline.background().unwrap().frames(), 4);
    }

    #[test]
    fn mismatched_frame_passes_through_and_keeps_state() {
        let mut pipeline = CloakPipeline::new(quiet_config(1)).unwrap();
        pipeline.step(&RgbImage::from_pixel(16, 16, GRAY)).unwrap();

        let odd = RgbImage::from_pixel(8, 8, BLUE);
        assert!(matches!(
            pipeline.step(&odd),
            Err(CloakError::DimensionMismatch { .. })
        ));
        assert_eq!(pipeline.process_frame(odd.clone()), odd);
        assert!(pipeline.is_active());
        assert_eq!(pipeline.background().unwrap().dimensions(), Dimensions::new(16, 16));
    }

    #[test]
    fn mismatched_frame_during_capture_is_not_counted() {
        let mut pipeline = CloakPipeline::new(quiet_config(3)).unwrap();
        pipeline.step(&RgbImage::from_pixel(16, 16, GRAY)).unwrap();
        let odd = RgbImage::from_pixel(4, 4, GRAY);
        assert_eq!(pipeline.process_frame(odd.clone()), odd);
        assert_eq!(
            pipeline.status(),
            Status::Capturing {
                captured: 1,
                needed: 3
            }
        );
    }

    #[test]
    fn empty_frame_is_rejected_in_both_states() {
        let mut pipeline = CloakPipeline::new(quiet_config(1)).unwrap();
        assert_eq!(pipeline.step(&RgbImage::new(0, 0)), Err(CloakError::EmptyFrame));
        assert!(!pipeline.is_active());

        pipeline.step(&RgbImage::from_pixel(16, 16, GRAY)).unwrap();
        assert_eq!(pipeline.process_frame(RgbImage::new(0, 5)), RgbImage::new(0, 5));
        assert!(pipeline.is_active());
    }

    #[test]
    fn active_step_replaces_target_color() {
        let background = {
            let mut est = BackgroundEstimator::new(1, 0.05);
            match est.update(&RgbImage::from_pixel(16, 16, GRAY)).unwrap() {
                CaptureProgress::Ready(bg) => bg,
                CaptureProgress::Pending { .. } => panic!("threshold of one must be ready"),
            }
        };
        let out = active_step(
            &ColorSegmenter::default(),
            &background,
            &RgbImage::from_pixel(16, 16, BLUE),
        )
        .unwrap();
        assert!(out.image.pixels().all(|p| *p == GRAY));
    }

    #[test]
    fn accumulation_failure_activates_with_last_frame() {
        let mut pipeline = CloakPipeline::new(quiet_config(3)).unwrap();
        pipeline.step(&RgbImage::from_pixel(16, 16, GRAY)).unwrap();
        match &mut pipeline.state {
            PipelineState::Capturing(estimator) => estimator.poison(),
            PipelineState::Active(_) => panic!("one of three frames must still be capturing"),
        }
        pipeline.step(&RgbImage::from_pixel(16, 16, GRAY)).unwrap();

        let last = RgbImage::from_pixel(16, 16, Rgb([90, 60, 30]));
        assert_eq!(pipeline.process_frame(last.clone()), last);
        assert!(pipeline.is_active());
        let background = pipeline.background().unwrap();
        assert_eq!(background.image(), &last);
        assert!(matches!(
            background.origin(),
            BackgroundOrigin::Fallback(CloakError::AccumulationFailure(_))
        ));

        // The fallback background takes part in blending like an averaged one.
        let cloaked = pipeline.step(&RgbImage::from_pixel(16, 16, BLUE)).unwrap();
        assert_eq!(cloaked.status, Status::Active);
        assert!(cloaked.image.pixels().all(|p| *p == Rgb([90, 60, 30])));
    }

    #[test]
    fn reset_returns_to_capturing() {
        let mut pipeline = CloakPipeline::new(quiet_config(1)).unwrap();
        pipeline.step(&RgbImage::from_pixel(16, 16, GRAY)).unwrap();
        assert!(pipeline.is_active());

        pipeline.reset_background();
        assert!(pipeline.background().is_none());
        assert_eq!(
            pipeline.status(),
            Status::Capturing {
                captured: 0,
                needed: 1
            }
        );

        // A new stream size is accepted after a reset.
        pipeline.step(&RgbImage::from_pixel(8, 8, GRAY)).unwrap();
        assert_eq!(pipeline.background().unwrap().dimensions(), Dimensions::new(8, 8));
    }

    #[test]
    fn overlay_marks_capture_frames() {
        let config = CloakConfig {
            background_frame_threshold: 2,
            ..CloakConfig::default()
        };
        let mut pipeline = CloakPipeline::new(config).unwrap();
        let frame = RgbImage::from_pixel(64, 48, GRAY);
        let out = pipeline.process_frame(frame.clone());
        assert_ne!(out, frame);
        assert_eq!(out.get_pixel(10, 10).0, [0, 255, 0]);
        assert_eq!(out.get_pixel(2, 44), &GRAY);

        // The default overlay carries the bundled font, so captions appear
        // below the bar.
        let below_bar = (10..64)
            .flat_map(|x| (22..48).map(move |y| (x, y)))
            .filter(|&(x, y)| *out.get_pixel(x, y) != GRAY)
            .count();
        assert!(below_bar > 0);
    }
}
