use super::{fit, OutputSink};
use anyhow::{Context, Result};
use image::RgbImage;
use std::io::Write;

/// Packed rgb24 frames written back to back, e.g. into
/// `ffplay -f rawvideo -pixel_format rgb24 -video_size WxH -`.
pub struct RawStreamOutput<W> {
    writer: W,
    width: u32,
    height: u32,
}

impl<W: Write> RawStreamOutput<W> {
    pub fn new(writer: W, width: u32, height: u32) -> Self {
        tracing::info!("Writing raw rgb24 frames at {}x{}", width, height);
        Self {
            writer,
            width,
            height,
        }
    }
}

impl<W: Write> OutputSink for RawStreamOutput<W> {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        let frame = fit(frame, self.width, self.height);
        self.writer
            .write_all(frame.as_raw())
            .and_then(|()| self.writer.flush())
            .context("Failed to write raw frame")
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
