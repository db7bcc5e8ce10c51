//! Error types for the enrichment engine.

use pipenet_core::SegmentId;
use thiserror::Error;

/// Result type alias for engine operations.
pub type NetworkResult<T> = Result<T, NetworkError>;

/// Errors that can occur while enriching a network.
///
/// Configuration problems abort a run before any output exists. Geometry problems
/// are reported per segment and only surface as errors from the per-segment helpers;
/// the pipeline records them as issues and keeps going.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// The configuration cannot be used for this input.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// Start and end point coincide, so the segment has no direction.
    #[error("degenerate geometry: segment {segment} has coincident start and end points")]
    DegenerateGeometry { segment: SegmentId },

    /// The feature has no usable start/end vertices.
    #[error("missing geometry: segment {segment} has fewer than two vertices")]
    MissingGeometry { segment: SegmentId },

    /// Two input features carry the same id.
    #[error("duplicate segment id: {segment} appears more than once in the input")]
    DuplicateSegment { segment: SegmentId },

    /// A segment referenced by id is not part of the snapshot.
    #[error("segment not found: {segment}")]
    UnknownSegment { segment: SegmentId },

    /// Configuration or snapshot (de)serialization failed.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl NetworkError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}
