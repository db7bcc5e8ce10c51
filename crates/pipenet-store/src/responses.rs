//! Response DTOs for store-backed runs.

use std::path::PathBuf;

use pipenet_engine::{FlaggedSegment, RunSummary};
use serde::{Deserialize, Serialize};

/// Result of an enrichment run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichResponse {
    pub input_layer: String,

    /// Layer the derived fields were written to.
    pub output_layer: String,

    pub summary: RunSummary,

    /// Per-segment data-quality issues.
    pub issues: Vec<FlaggedSegment>,

    /// Fields the output layer did not have before.
    pub added_fields: Vec<String>,

    /// Features written.
    pub updated: usize,

    /// Where the run report was saved, for stores that keep them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_path: Option<PathBuf>,
}

impl EnrichResponse {
    pub fn issue_count(&self) -> usize {
        self.issues.len()
    }
}

/// Result of a point assignment run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointsResponse {
    pub line_layer: String,
    pub point_layer: String,

    /// Segment ends that found a point.
    pub assigned_endpoints: usize,

    pub added_fields: Vec<String>,
    pub updated: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_path: Option<PathBuf>,
}

/// Result of a roll-up run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollUpResponse {
    pub point_layer: String,
    pub point_field: String,

    /// Points that received a non-empty value.
    pub with_values: usize,

    pub added_fields: Vec<String>,
    pub updated: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_path: Option<PathBuf>,
}
