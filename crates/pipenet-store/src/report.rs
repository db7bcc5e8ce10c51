//! Run reports persisted next to the layers.

use std::time::SystemTime;

use pipenet_engine::{FlaggedSegment, RunSummary};
use serde::{Deserialize, Serialize};

/// Which operation produced a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Enrich,
    AssignPoints,
    RollUp,
}

/// What a run read, wrote and found.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub kind: RunKind,
    pub input_layer: String,
    pub output_layer: String,
    pub saved_at: SystemTime,
    /// Features whose attributes were written.
    pub updated: usize,
    /// Fields added to the output layer.
    #[serde(default)]
    pub added_fields: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<RunSummary>,
    #[serde(default)]
    pub issues: Vec<FlaggedSegment>,
}

impl RunReport {
    pub fn new(kind: RunKind, input_layer: impl Into<String>, output_layer: impl Into<String>) -> Self {
        Self {
            kind,
            input_layer: input_layer.into(),
            output_layer: output_layer.into(),
            saved_at: SystemTime::now(),
            updated: 0,
            added_fields: Vec::new(),
            summary: None,
            issues: Vec::new(),
        }
    }

    /// Seconds since the epoch, used to name report files.
    pub fn timestamp(&self) -> u64 {
        self.saved_at
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default()
    }
}
