use crate::types::Dimensions;

/// Errors produced by the cloak pipeline.
///
/// Only [`CloakError::InvalidConfig`] is fatal; every other variant is local
/// to a single frame and leaves the pipeline ready for the next one.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CloakError {
    /// The frame has zero width or height.
    #[error("frame has zero area")]
    EmptyFrame,

    /// A raw pixel buffer does not match its declared dimensions.
    #[error("malformed frame: expected {expected} bytes, got {actual}")]
    MalformedFrame { expected: usize, actual: usize },

    /// The frame size differs from the size established by the stream.
    #[error("frame is {actual}, stream is {expected}")]
    DimensionMismatch {
        expected: Dimensions,
        actual: Dimensions,
    },

    /// Updating the background accumulator failed.
    #[error("background accumulation failed: {0}")]
    AccumulationFailure(String),

    /// Pipeline configuration is invalid.
    #[error("invalid cloak configuration: {0}")]
    InvalidConfig(String),
}

impl CloakError {
    /// Whether the error invalidates the pipeline rather than a single frame.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::InvalidConfig(_))
    }
}
