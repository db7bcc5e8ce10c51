//! Adjacency, direction and material inference for pipe networks.
//!
//! The engine turns a layer of line features into per-segment derived facts:
//!
//! - which segments touch each endpoint (within a distance tolerance),
//! - the bearing and compass direction of each segment,
//! - the material at each endpoint, propagated from known neighbors over bounded passes.
//!
//! ## Pipeline
//!
//! ```text
//! LineFeature ─▶ GeometryExtractor ─▶ Segment ─▶ EndpointMatcher ─▶ AdjacencyIndex
//!                                                       │
//!                           DirectionClassifier ◀───────┴───────▶ MaterialInference
//!                                   │                                   │
//!                                   └────────────▶ SegmentRecord ◀──────┘
//! ```
//!
//! Everything here is pure computation over an immutable snapshot; reading and
//! writing feature layers lives in `pipenet-store`.
//!
//! ## Passes
//!
//! [`MaterialInference::run_pass`] maps one [`Snapshot`] to the next and reports whether
//! anything changed. Only codes already present in the input snapshot act as seeds, so a
//! code travels one junction per pass. [`MaterialInference::converge`] loops until a fixed
//! point or the configured [`PassLimit`].

mod bearing;
pub mod config;
mod error;
mod extract;
mod inference;
mod issue;
pub mod junctions;
mod matcher;
mod pipeline;
mod rule;
#[cfg(any(test, feature = "test-fixtures"))]
pub mod test_fixtures;

pub use bearing::{bearing, classify, DirectionClassifier, Heading};
pub use config::{
    BoundaryTieBreak, EnrichConfig, FieldNames, InferencePolicy, MaterialEntry, MaterialTable,
    OutputNaming, PassLimit, SourcePrecedence, UnmappedCodePolicy, DEFAULT_MAX_PASSES,
    DEFAULT_POINT_TOLERANCE, DEFAULT_TOLERANCE,
};
pub use error::{NetworkError, NetworkResult};
pub use extract::{Extraction, GeometryExtractor, Segment};
pub use inference::{
    CodeOrigin, Convergence, ConvergenceCriterion, FixedPointCriterion, MaterialInference,
    NoNewCodesCriterion, PassOutcome, PassReport, SegmentState, Snapshot,
};
pub use issue::{FlaggedSegment, SegmentIssue};
pub use junctions::{roll_up_line_values, EndpointPoints, JunctionPoints, PointMatch};
pub use matcher::{AdjacencyIndex, EndpointMatcher, EndpointRef, Junction, JunctionId};
pub use pipeline::{enrich, Enricher, Enrichment, JunctionReport, RunSummary, SegmentRecord};
pub use rule::{
    AgreeingKnownNeighborsRule, ConflictingNeighborsRule, EndpointContext, MaterialRule,
    NeighborCode, RuleId, RuleOutcome, RuleRegistry, SingleKnownNeighborRule,
    UnanimousNeighborsRule,
};

// Shared domain types.
pub use pipenet_core;
