//! Per-segment data-quality findings recorded alongside the output.

use pipenet_core::{EndKind, SegmentId, TypeCode};
use serde::{Deserialize, Serialize};

/// A data-quality problem that did not stop the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SegmentIssue {
    /// Start and end coincide; excluded from adjacency and direction.
    DegenerateGeometry,
    /// Fewer than two vertices; nothing could be derived.
    MissingGeometry,
    /// Known neighbor codes disagree at this endpoint, so it stays unresolved.
    AmbiguousMaterial { end: EndKind, codes: Vec<TypeCode> },
}

impl SegmentIssue {
    pub fn label(&self) -> &'static str {
        match self {
            SegmentIssue::DegenerateGeometry => "degenerate_geometry",
            SegmentIssue::MissingGeometry => "missing_geometry",
            SegmentIssue::AmbiguousMaterial { .. } => "ambiguous_material",
        }
    }
}

/// An issue attached to the segment it concerns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlaggedSegment {
    pub segment: SegmentId,
    pub issue: SegmentIssue,
}
