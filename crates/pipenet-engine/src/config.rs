//! Run configuration: tolerance, material table, pass limits, policies and field names.
//!
//! Everything here is validated up front by [`EnrichConfig::validate`]; a run never
//! starts with a configuration it would have to reject halfway through.

use std::collections::BTreeSet;

use pipenet_core::TypeCode;
use serde::{Deserialize, Serialize};

use crate::error::{NetworkError, NetworkResult};

/// Default endpoint matching tolerance, in working-frame units (feet or meters).
pub const DEFAULT_TOLERANCE: f64 = 0.001;

/// Default search distance when snapping endpoints to point features.
pub const DEFAULT_POINT_TOLERANCE: f64 = 0.05;

/// Default upper bound on inference passes.
pub const DEFAULT_MAX_PASSES: usize = 10;

// =============================================================================
// Material table
// =============================================================================

/// One `code -> material name` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialEntry {
    pub code: i64,
    pub name: String,
}

/// Ordered lookup from type code to material name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaterialTable {
    entries: Vec<MaterialEntry>,
}

impl Default for MaterialTable {
    fn default() -> Self {
        Self::from_pairs([
            (1, "PVC"),
            (2, "RCP"),
            (3, "Cast Iron"),
            (4, "Ductile Iron"),
            (5, "VCP"),
            (6, "R.C.C.P"),
        ])
    }
}

impl MaterialTable {
    /// Empty table.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Build from `(code, name)` pairs, keeping their order.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (i64, S)>,
        S: Into<String>,
    {
        Self {
            entries: pairs
                .into_iter()
                .map(|(code, name)| MaterialEntry {
                    code,
                    name: name.into(),
                })
                .collect(),
        }
    }

    /// Add an entry (builder pattern).
    pub fn with(mut self, code: i64, name: impl Into<String>) -> Self {
        self.entries.push(MaterialEntry {
            code,
            name: name.into(),
        });
        self
    }

    pub fn entries(&self) -> &[MaterialEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Material name for a code.
    pub fn name(&self, code: TypeCode) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.code == code.0)
            .map(|e| e.name.as_str())
    }

    pub fn contains(&self, code: TypeCode) -> bool {
        self.name(code).is_some()
    }

    /// Reject duplicate codes and blank names.
    pub fn validate(&self) -> NetworkResult<()> {
        let mut seen = BTreeSet::new();
        for entry in &self.entries {
            if !seen.insert(entry.code) {
                return Err(NetworkError::configuration(format!(
                    "material table lists code {} more than once",
                    entry.code
                )));
            }
            if entry.name.trim().is_empty() {
                return Err(NetworkError::configuration(format!(
                    "material table entry for code {} has an empty name",
                    entry.code
                )));
            }
        }
        Ok(())
    }

    /// Check that every code present in the input has a mapping.
    ///
    /// Returns the codes without a mapping when the policy tolerates them.
    pub fn check_codes(
        &self,
        codes: impl IntoIterator<Item = TypeCode>,
        policy: UnmappedCodePolicy,
    ) -> NetworkResult<BTreeSet<TypeCode>> {
        let unmapped: BTreeSet<TypeCode> = codes.into_iter().filter(|c| !self.contains(*c)).collect();
        if unmapped.is_empty() || policy == UnmappedCodePolicy::TreatAsUnknown {
            return Ok(unmapped);
        }
        let listed: Vec<String> = unmapped.iter().map(|c| c.to_string()).collect();
        Err(NetworkError::configuration(format!(
            "no material mapping for type code(s) {}",
            listed.join(", ")
        )))
    }
}

// =============================================================================
// Policies
// =============================================================================

/// What to do with input type codes missing from the material table.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmappedCodePolicy {
    /// Fail the run before processing.
    #[default]
    Reject,
    /// Treat the segment's code as unknown.
    TreatAsUnknown,
}

/// Resolution of bearings that fall exactly on a sector boundary (22.5°, 67.5°, ...).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryTieBreak {
    /// 22.5° belongs to NE, 337.5° to N: sectors are `[lo, hi)`.
    #[default]
    TowardHigher,
    /// 22.5° belongs to N, 337.5° to NW: sectors are `(lo, hi]`.
    TowardLower,
}

/// Which provenance wins when a segment has a recorded code and also got
/// materials from its neighbors.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourcePrecedence {
    /// A recorded code always reports `Legacy`.
    #[default]
    LegacyFirst,
    /// Report `Adjacency` whenever neighbors resolved an endpoint.
    AdjacencyFirst,
}

/// Knobs of the inference rules and direction classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferencePolicy {
    #[serde(default)]
    pub tie_break: BoundaryTieBreak,

    #[serde(default)]
    pub precedence: SourcePrecedence,

    /// Resolve an endpoint when all known neighbors agree even if other
    /// neighbors are unknown.
    #[serde(default = "default_true")]
    pub resolve_partial_agreement: bool,
}

impl Default for InferencePolicy {
    fn default() -> Self {
        Self {
            tie_break: BoundaryTieBreak::default(),
            precedence: SourcePrecedence::default(),
            resolve_partial_agreement: true,
        }
    }
}

/// Bound on the multi-pass driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassLimit {
    /// Hard cap on passes; at least 1.
    pub max_passes: usize,

    /// Stop early once a pass changes nothing.
    pub stop_on_convergence: bool,
}

impl Default for PassLimit {
    fn default() -> Self {
        Self {
            max_passes: DEFAULT_MAX_PASSES,
            stop_on_convergence: true,
        }
    }
}

impl PassLimit {
    /// Exactly `n` passes, no early stop.
    pub fn exactly(n: usize) -> Self {
        Self {
            max_passes: n,
            stop_on_convergence: false,
        }
    }

    /// Up to `n` passes, stopping at the fixed point.
    pub fn until_converged(n: usize) -> Self {
        Self {
            max_passes: n,
            stop_on_convergence: true,
        }
    }
}

// =============================================================================
// Field names and output naming
// =============================================================================

/// Attribute names read from and written to the feature store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldNames {
    pub id: String,
    pub type_code: String,
    /// Code inferred by a run; read back as a seed when a later run takes the output as input.
    pub inferred_code: String,
    pub from_adjacent: String,
    pub to_adjacent: String,
    pub bearing: String,
    pub direction: String,
    pub material_source: String,
    pub from_material: String,
    pub to_material: String,
    pub from_point_id: String,
    pub to_point_id: String,
    pub from_point_type: String,
    pub to_point_type: String,
    pub connected_point_count: String,
    pub point_id: String,
    pub point_type: String,
}

impl Default for FieldNames {
    fn default() -> Self {
        Self {
            id: "FACILITYID".into(),
            type_code: "PIPE_TYPE".into(),
            inferred_code: "Inferred_Code".into(),
            from_adjacent: "from_adjacent_id".into(),
            to_adjacent: "to_adjacent_id".into(),
            bearing: "direction_float".into(),
            direction: "direction_text".into(),
            material_source: "Material_Source".into(),
            from_material: "From_Material".into(),
            to_material: "To_Material".into(),
            from_point_id: "from_point_id".into(),
            to_point_id: "to_point_id".into(),
            from_point_type: "from_point_type".into(),
            to_point_type: "to_point_type".into(),
            connected_point_count: "connected_point_count".into(),
            point_id: "FACILITYID".into(),
            point_type: "FEATURE_DE".into(),
        }
    }
}

/// How the materialized output layer is named.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputNaming {
    pub suffix: String,
}

impl Default for OutputNaming {
    fn default() -> Self {
        Self {
            suffix: "enriched".into(),
        }
    }
}

impl OutputNaming {
    /// `{input}_{suffix}`.
    pub fn output_name(&self, input: &str) -> String {
        format!("{}_{}", input, self.suffix)
    }
}

// =============================================================================
// EnrichConfig
// =============================================================================

/// Complete configuration of an enrichment run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichConfig {
    /// Endpoints within this distance are the same physical node.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,

    /// Permit `tolerance == 0` (exact coordinate matching).
    #[serde(default)]
    pub allow_exact_match: bool,

    #[serde(default)]
    pub materials: MaterialTable,

    /// Codes that mean "unknown" in the source data.
    #[serde(default = "default_unknown_codes")]
    pub unknown_codes: Vec<i64>,

    #[serde(default)]
    pub unmapped_codes: UnmappedCodePolicy,

    #[serde(default)]
    pub passes: PassLimit,

    #[serde(default)]
    pub policy: InferencePolicy,

    /// Search distance for endpoint-to-point assignment.
    #[serde(default = "default_point_tolerance")]
    pub point_tolerance: f64,

    #[serde(default)]
    pub fields: FieldNames,

    #[serde(default)]
    pub output: OutputNaming,
}

fn default_tolerance() -> f64 {
    DEFAULT_TOLERANCE
}

fn default_point_tolerance() -> f64 {
    DEFAULT_POINT_TOLERANCE
}

fn default_unknown_codes() -> Vec<i64> {
    vec![0]
}

fn default_true() -> bool {
    true
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            allow_exact_match: false,
            materials: MaterialTable::default(),
            unknown_codes: default_unknown_codes(),
            unmapped_codes: UnmappedCodePolicy::default(),
            passes: PassLimit::default(),
            policy: InferencePolicy::default(),
            point_tolerance: DEFAULT_POINT_TOLERANCE,
            fields: FieldNames::default(),
            output: OutputNaming::default(),
        }
    }
}

impl EnrichConfig {
    /// Config with a specific tolerance.
    pub fn with_tolerance(tolerance: f64) -> Self {
        Self {
            tolerance,
            allow_exact_match: tolerance == 0.0,
            ..Default::default()
        }
    }

    /// Parse from JSON, then validate.
    pub fn from_json(json: &str) -> NetworkResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Whether a raw code means "unknown".
    pub fn is_unknown_code(&self, code: TypeCode) -> bool {
        self.unknown_codes.contains(&code.0)
    }

    /// Structural validation; input-dependent checks happen in the pipeline.
    pub fn validate(&self) -> NetworkResult<()> {
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(NetworkError::configuration(format!(
                "tolerance must be a finite non-negative distance, got {}",
                self.tolerance
            )));
        }
        if self.tolerance == 0.0 && !self.allow_exact_match {
            return Err(NetworkError::configuration(
                "tolerance is 0; set allow_exact_match to match exact coordinates only",
            ));
        }
        if !self.point_tolerance.is_finite() || self.point_tolerance < 0.0 {
            return Err(NetworkError::configuration(format!(
                "point_tolerance must be a finite non-negative distance, got {}",
                self.point_tolerance
            )));
        }
        if self.passes.max_passes == 0 {
            return Err(NetworkError::configuration("max_passes must be at least 1"));
        }
        self.materials.validate()?;
        if let Some(code) = self
            .unknown_codes
            .iter()
            .find(|c| self.materials.contains(TypeCode(**c)))
        {
            return Err(NetworkError::configuration(format!(
                "code {code} is declared unknown but also mapped to a material"
            )));
        }
        if self.fields.type_code.trim().is_empty() {
            return Err(NetworkError::configuration("type code field name is empty"));
        }
        Ok(())
    }

    /// Get a scalar setting by key.
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "tolerance" => Some(self.tolerance.to_string()),
            "allow_exact_match" => Some(self.allow_exact_match.to_string()),
            "point_tolerance" => Some(self.point_tolerance.to_string()),
            "max_passes" => Some(self.passes.max_passes.to_string()),
            "stop_on_convergence" => Some(self.passes.stop_on_convergence.to_string()),
            "output_suffix" => Some(self.output.suffix.clone()),
            "type_code_field" => Some(self.fields.type_code.clone()),
            "id_field" => Some(self.fields.id.clone()),
            "inferred_code_field" => Some(self.fields.inferred_code.clone()),
            _ => None,
        }
    }

    /// Set a scalar setting by key.
    pub fn set(&mut self, key: &str, value: &str) -> NetworkResult<()> {
        let invalid = |what: &str| NetworkError::configuration(format!("invalid {what}: {value}"));
        match key {
            "tolerance" => self.tolerance = value.parse().map_err(|_| invalid("number"))?,
            "allow_exact_match" => {
                self.allow_exact_match = value.parse().map_err(|_| invalid("boolean"))?
            }
            "point_tolerance" => {
                self.point_tolerance = value.parse().map_err(|_| invalid("number"))?
            }
            "max_passes" => self.passes.max_passes = value.parse().map_err(|_| invalid("count"))?,
            "stop_on_convergence" => {
                self.passes.stop_on_convergence = value.parse().map_err(|_| invalid("boolean"))?
            }
            "output_suffix" => self.output.suffix = value.to_string(),
            "type_code_field" => self.fields.type_code = value.to_string(),
            "id_field" => self.fields.id = value.to_string(),
            "inferred_code_field" => self.fields.inferred_code = value.to_string(),
            _ => {
                return Err(NetworkError::configuration(format!(
                    "unknown config key: {key}"
                )))
            }
        }
        Ok(())
    }
}
