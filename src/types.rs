//! Shared types for the cloak pipeline.

use std::fmt;
use std::str::FromStr;

use image::{Luma, RgbImage};
use imageproc::definitions::Image;

use crate::error::CloakError;

/// Per-pixel target confidence, same size as the frame it was computed from.
///
/// Values lie in `[0.0, 255.0]`; after smoothing they are continuous
/// weights rather than a strict binary mask.
pub type Mask = Image<Luma<f32>>;

/// Frame dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[must_use]
    pub fn of(image: &RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self { width, height }
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Number of bytes in a packed rgb24 frame of this size.
    #[must_use]
    pub const fn rgb_len(self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A colour in the 8-bit HSV convention: hue in `[0, 180)`, saturation and
/// value in `[0, 255]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hsv {
    pub h: u8,
    pub s: u8,
    pub v: u8,
}

impl Hsv {
    /// Exclusive upper bound of the hue channel.
    pub const HUE_LIMIT: u8 = 180;

    #[must_use]
    pub const fn new(h: u8, s: u8, v: u8) -> Self {
        Self { h, s, v }
    }

    /// Convert an RGB pixel into the 8-bit HSV convention.
    #[must_use]
    pub fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        let (rf, gf, bf) = (f32::from(r), f32::from(g), f32::from(b));
        let max = rf.max(gf).max(bf);
        let min = rf.min(gf).min(bf);
        let delta = max - min;

        let s = if max > 0.0 { 255.0 * delta / max } else { 0.0 };

        let mut hue = if delta == 0.0 {
            0.0
        } else if max == rf {
            60.0 * (gf - bf) / delta
        } else if max == gf {
            120.0 + 60.0 * (bf - rf) / delta
        } else {
            240.0 + 60.0 * (rf - gf) / delta
        };
        if hue < 0.0 {
            hue += 360.0;
        }

        // Half-degree hue; 359.x rounds up to 180 and wraps to red.
        let h = (hue / 2.0).round() as u16 % u16::from(Self::HUE_LIMIT);

        Self {
            h: h as u8,
            s: s.round().clamp(0.0, 255.0) as u8,
            v: max as u8,
        }
    }
}

impl FromStr for Hsv {
    type Err = String;

    /// Parse `"h,s,v"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        let [h, s, v] = parts[..] else {
            return Err(format!("expected \"h,s,v\", got {s:?}"));
        };
        let channel = |name: &str, text: &str| {
            text.parse::<u8>()
                .map_err(|e| format!("invalid {name} component {text:?}: {e}"))
        };
        Ok(Self::new(
            channel("hue", h)?,
            channel("saturation", s)?,
            channel("value", v)?,
        ))
    }
}

impl fmt::Display for Hsv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.h, self.s, self.v)
    }
}

/// Inclusive HSV bounds selecting the colour family to cloak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorRange {
    pub lower: Hsv,
    pub upper: Hsv,
}

impl ColorRange {
    /// Bright and mid blues.
    pub const BLUE: Self = Self {
        lower: Hsv::new(90, 50, 50),
        upper: Hsv::new(130, 255, 255),
    };

    /// Build a range, checking that the bounds are ordered and the hues are
    /// representable.
    ///
    /// # Errors
    ///
    /// Returns [`CloakError::InvalidConfig`] if any lower component exceeds
    /// its upper counterpart, or a hue is at or above [`Hsv::HUE_LIMIT`].
    pub fn new(lower: Hsv, upper: Hsv) -> Result<Self, CloakError> {
        let range = Self { lower, upper };
        range.validate()?;
        Ok(range)
    }

    /// # Errors
    ///
    /// See [`ColorRange::new`].
    pub fn validate(&self) -> Result<(), CloakError> {
        let (lo, hi) = (self.lower, self.upper);
        if lo.h > hi.h || lo.s > hi.s || lo.v > hi.v {
            return Err(CloakError::InvalidConfig(format!(
                "color range lower bound ({lo}) exceeds upper bound ({hi})"
            )));
        }
        if hi.h >= Hsv::HUE_LIMIT {
            return Err(CloakError::InvalidConfig(format!(
                "hue {} is outside [0, {})",
                hi.h,
                Hsv::HUE_LIMIT
            )));
        }
        Ok(())
    }

    #[must_use]
    pub const fn contains(&self, c: Hsv) -> bool {
        c.h >= self.lower.h
            && c.h <= self.upper.h
            && c.s >= self.lower.s
            && c.s <= self.upper.s
            && c.v >= self.lower.v
            && c.v <= self.upper.v
    }
}

impl Default for ColorRange {
    fn default() -> Self {
        Self::BLUE
    }
}

/// Wrap a packed rgb24 buffer as a frame, checking its length.
///
/// # Errors
///
/// Returns [`CloakError::EmptyFrame`] for a zero-area size and
/// [`CloakError::MalformedFrame`] when `bytes` is not exactly
/// `width * height * 3` long.
pub fn frame_from_raw(width: u32, height: u32, bytes: Vec<u8>) -> Result<RgbImage, CloakError> {
    let dims = Dimensions::new(width, height);
    if dims.is_empty() {
        return Err(CloakError::EmptyFrame);
    }
    let expected = dims.rgb_len();
    let actual = bytes.len();
    if actual != expected {
        return Err(CloakError::MalformedFrame { expected, actual });
    }
    RgbImage::from_raw(width, height, bytes)
        .ok_or(CloakError::MalformedFrame { expected, actual })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn primaries_map_to_half_degree_hues() {
        assert_eq!(Hsv::from_rgb(255, 0, 0), Hsv::new(0, 255, 255));
        assert_eq!(Hsv::from_rgb(0, 255, 0), Hsv::new(60, 255, 255));
        assert_eq!(Hsv::from_rgb(0, 0, 255), Hsv::new(120, 255, 255));
    }

    #[test]
    fn gray_has_zero_saturation() {
        let hsv = Hsv::from_rgb(128, 128, 128);
        assert_eq!(hsv, Hsv::new(0, 0, 128));
    }

    #[test]
    fn black_is_all_zero() {
        assert_eq!(Hsv::from_rgb(0, 0, 0), Hsv::new(0, 0, 0));
    }

    #[test]
    fn near_red_magenta_wraps_below_limit() {
        let hsv = Hsv::from_rgb(255, 0, 1);
        assert!(hsv.h < Hsv::HUE_LIMIT, "hue {} out of range", hsv.h);
    }

    #[test]
    fn default_range_is_blue() {
        let range = ColorRange::default();
        assert!(range.contains(Hsv::from_rgb(0, 0, 255)));
        assert!(range.contains(Hsv::from_rgb(30, 60, 200)));
        assert!(!range.contains(Hsv::from_rgb(255, 0, 0)));
        assert!(!range.contains(Hsv::from_rgb(128, 128, 128)));
    }

    #[test]
    fn range_bounds_are_inclusive() {
        let range = ColorRange::BLUE;
        assert!(range.contains(range.lower));
        assert!(range.contains(range.upper));
        assert!(!range.contains(Hsv::new(89, 255, 255)));
    }

    #[test]
    fn inverted_range_is_rejected() {
        let result = ColorRange::new(Hsv::new(130, 50, 50), Hsv::new(90, 255, 255));
        assert!(matches!(result, Err(CloakError::InvalidConfig(_))));
    }

    #[test]
    fn hue_at_limit_is_rejected() {
        let result = ColorRange::new(Hsv::new(0, 0, 0), Hsv::new(180, 255, 255));
        assert!(matches!(result, Err(CloakError::InvalidConfig(_))));
    }

    #[test]
    fn parse_hsv_triplet() {
        assert_eq!("90, 50,50".parse::<Hsv>().unwrap(), Hsv::new(90, 50, 50));
        assert!("90,50".parse::<Hsv>().is_err());
        assert!("90,50,300".parse::<Hsv>().is_err());
    }

    #[test]
    fn raw_frame_length_is_checked() {
        let frame = frame_from_raw(2, 2, vec![0; 12]).unwrap();
        assert_eq!(frame.dimensions(), (2, 2));

        let short = frame_from_raw(2, 2, vec![0; 11]);
        assert_eq!(
            short,
            Err(CloakError::MalformedFrame {
                expected: 12,
                actual: 11
            })
        );

        let long = frame_from_raw(2, 2, vec![0; 13]);
        assert!(matches!(long, Err(CloakError::MalformedFrame { .. })));
    }

    #[test]
    fn raw_frame_rejects_zero_area() {
        assert_eq!(frame_from_raw(0, 4, Vec::new()), Err(CloakError::EmptyFrame));
    }
}
