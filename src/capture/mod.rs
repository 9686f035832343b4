mod raw;
mod v4l_capture;

pub use raw::RawStreamCapture;
pub use v4l_capture::WebcamCapture;

use anyhow::Result;
use image::RgbImage;

/// Trait for frame sources feeding the cloak pipeline
pub trait CaptureSource {
    /// Capture the next frame, or `None` once the source is exhausted
    fn capture_frame(&mut self) -> Result<Option<RgbImage>>;

    /// Get the resolution of captured frames
    fn resolution(&self) -> (u32, u32);
}
