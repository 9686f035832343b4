use super::CaptureSource;
use anyhow::{bail, Context, Result};
use cloak_fx::frame_from_raw;
use image::RgbImage;
use std::io::{ErrorKind, Read};

/// Packed rgb24 frames of a fixed size read back to back from a byte stream,
/// e.g. `ffmpeg -f rawvideo -pix_fmt rgb24` piped into stdin.
pub struct RawStreamCapture<R> {
    reader: R,
    width: u32,
    height: u32,
    frame_len: usize,
}

impl<R: Read> RawStreamCapture<R> {
    pub fn new(reader: R, width: u32, height: u32) -> Result<Self> {
        let frame_len = width as usize * height as usize * 3;
        if frame_len == 0 {
            bail!("raw stream frame size {}x{} has zero area", width, height);
        }
        tracing::info!("Reading raw rgb24 frames at {}x{}", width, height);
        Ok(Self {
            reader,
            width,
            height,
            frame_len,
        })
    }

    /// Fill `buf`, returning how many bytes were read before end of stream.
    fn fill(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut read = 0;
        while read < buf.len() {
            match self.reader.read(&mut buf[read..]) {
                Ok(0) => break,
                Ok(n) => read += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e).context("Failed to read raw frame"),
            }
        }
        Ok(read)
    }
}

impl<R: Read> CaptureSource for RawStreamCapture<R> {
    fn capture_frame(&mut self) -> Result<Option<RgbImage>> {
        let mut buf = vec![0u8; self.frame_len];
        let read = self.fill(&mut buf)?;
        if read == 0 {
            return Ok(None);
        }
        if read < self.frame_len {
            tracing::warn!(
                "Discarding truncated frame ({} of {} bytes) at end of stream",
                read,
                self.frame_len
            );
            return Ok(None);
        }
        let frame =
            frame_from_raw(self.width, self.height, buf).context("Failed to wrap raw frame")?;
        Ok(Some(frame))
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
