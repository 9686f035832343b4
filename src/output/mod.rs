mod loopback;
mod raw;

pub use loopback::V4L2Output;
pub use raw::RawStreamOutput;

use anyhow::Result;
use image::RgbImage;

/// Trait for output destinations
pub trait OutputSink {
    /// Write a frame to the output
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()>;

    /// Get the expected output resolution
    fn resolution(&self) -> (u32, u32);
}

/// Resize `frame` to `width`x`height` unless it already has that size.
fn fit(frame: &RgbImage, width: u32, height: u32) -> std::borrow::Cow<'_, RgbImage> {
    if frame.dimensions() == (width, height) {
        std::borrow::Cow::Borrowed(frame)
    } else {
        std::borrow::Cow::Owned(image::imageops::resize(
            frame,
            width,
            height,
            image::imageops::FilterType::Triangle,
        ))
    }
}
