//! Status indicators drawn on top of output frames.
//!
//! A progress bar is drawn while the background is being captured and a
//! small badge once the cloak is active. The status captions are rendered
//! below them with the bundled DejaVu Sans unless another font is supplied
//! or text is turned off with [`StatusOverlay::indicators_only`].

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::pipeline::Status;

const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
const TRACK: Rgb<u8> = Rgb([32, 32, 32]);

const MARGIN: u32 = 10;
const BAR_WIDTH: u32 = 200;
const BAR_HEIGHT: u32 = 8;
const BADGE: u32 = 12;
const TEXT_SCALE: f32 = 22.0;
const LINE_HEIGHT: i32 = 28;

static DEJAVU_SANS: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

/// The bundled caption font, or `None` if it fails to parse.
#[must_use]
pub fn embedded_font() -> Option<FontArc> {
    match FontArc::try_from_slice(DEJAVU_SANS) {
        Ok(font) => Some(font),
        Err(err) => {
            tracing::warn!(error = %err, "bundled font unusable, captions disabled");
            None
        }
    }
}

/// Draws [`Status`] onto frames.
#[derive(Clone)]
pub struct StatusOverlay {
    font: Option<FontArc>,
}

impl std::fmt::Debug for StatusOverlay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusOverlay")
            .field("font", &self.font.is_some())
            .finish()
    }
}

impl StatusOverlay {
    /// Indicators plus captions in the bundled font.
    #[must_use]
    pub fn new() -> Self {
        Self {
            font: embedded_font(),
        }
    }

    /// Geometric indicators without text.
    #[must_use]
    pub const fn indicators_only() -> Self {
        Self { font: None }
    }

    /// Render the captions with `font`.
    #[must_use]
    pub fn with_font(font: FontArc) -> Self {
        Self { font: Some(font) }
    }

    #[must_use]
    pub const fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Draw the indicators for `status`. Frames too small to hold them are
    /// left untouched.
    pub fn draw(&self, image: &mut RgbImage, status: &Status) {
        let (width, height) = image.dimensions();
        if width <= 2 * MARGIN || height <= 2 * MARGIN {
            return;
        }

        let text_top = match *status {
            Status::Capturing { captured, needed } => {
                let track = BAR_WIDTH.min(width - 2 * MARGIN);
                let filled = (u64::from(track) * u64::from(captured.min(needed))
                    / u64::from(needed.max(1))) as u32;
                fill(image, MARGIN, MARGIN, track, BAR_HEIGHT, TRACK);
                fill(image, MARGIN, MARGIN, filled, BAR_HEIGHT, GREEN);
                MARGIN + BAR_HEIGHT + 4
            }
            Status::Active => {
                fill(image, MARGIN, MARGIN, BADGE, BADGE, GREEN);
                MARGIN + BADGE + 4
            }
        };

        if let Some(font) = &self.font {
            let scale = PxScale::from(TEXT_SCALE);
            let mut y = text_top as i32;
            for line in status.captions() {
                draw_text_mut(image, GREEN, MARGIN as i32, y, scale, font, &line);
                y += LINE_HEIGHT;
            }
        }
    }
}

impl Default for StatusOverlay {
    fn default() -> Self {
        Self::new()
    }
}

fn fill(image: &mut RgbImage, x: u32, y: u32, width: u32, height: u32, color: Rgb<u8>) {
    if width == 0 || height == 0 {
        return;
    }
    draw_filled_rect_mut(image, Rect::at(x as i32, y as i32).of_size(width, height), color);
}
