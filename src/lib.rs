//! cloak-fx: colour-keyed "invisibility cloak" for live video.
//!
//! Frames of one stream go through a [`CloakPipeline`]. The first frames are
//! averaged into a still background; after that, every pixel matching the
//! target colour is replaced with the background behind it.
//!
//! The library does no I/O. Capturing and delivering frames is left to the
//! host (see the `cloak-fx` binary).

pub mod background;
pub mod composite;
pub mod config;
pub mod error;
pub mod overlay;
pub mod pipeline;
pub mod segment;
pub mod types;

pub use background::{Background, BackgroundEstimator, BackgroundOrigin, CaptureProgress};
pub use config::CloakConfig;
pub use error::CloakError;
pub use overlay::StatusOverlay;
pub use pipeline::{CloakPipeline, PipelineState, Processed, Status};
pub use segment::ColorSegmenter;
pub use types::{frame_from_raw, ColorRange, Dimensions, Hsv, Mask};
