//! Material inference: bounded, snapshot-to-snapshot passes over the adjacency index.
//!
//! A pass reads neighbor codes only from its input [`Snapshot`], so values inferred
//! during a pass never feed other segments in the same pass and the result does not
//! depend on evaluation order. Feeding the output back in as the next snapshot
//! propagates codes one junction further per pass.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use pipenet_core::{EndKind, MaterialSource, SegmentId, TypeCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{InferencePolicy, MaterialTable, PassLimit, SourcePrecedence};
use crate::error::{NetworkError, NetworkResult};
use crate::extract::Segment;
use crate::issue::{FlaggedSegment, SegmentIssue};
use crate::matcher::AdjacencyIndex;
use crate::rule::{EndpointContext, NeighborCode, RuleOutcome, RuleRegistry};

/// Where a segment's code in a snapshot came from.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeOrigin {
    #[default]
    Unknown,
    /// Present in the input before any pass ran.
    Recorded,
    /// Filled in by an earlier pass.
    Inferred,
}

/// Per-segment inference state.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentState {
    pub code: Option<TypeCode>,
    pub origin: CodeOrigin,
    pub from_code: Option<TypeCode>,
    pub to_code: Option<TypeCode>,
    pub source: MaterialSource,
}

impl SegmentState {
    pub fn endpoint_code(&self, end: EndKind) -> Option<TypeCode> {
        match end {
            EndKind::Start => self.from_code,
            EndKind::End => self.to_code,
        }
    }

    /// Material names for `(from, to)`.
    pub fn materials<'t>(&self, table: &'t MaterialTable) -> (Option<&'t str>, Option<&'t str>) {
        (
            self.from_code.and_then(|c| table.name(c)),
            self.to_code.and_then(|c| table.name(c)),
        )
    }
}

/// Codes and materials of every segment at one point in the pass sequence.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Number of passes that produced this snapshot (0 for the input).
    pub pass: u32,
    pub states: BTreeMap<SegmentId, SegmentState>,
}

impl Snapshot {
    /// Initial snapshot from extracted segments.
    pub fn from_segments<'a>(segments: impl IntoIterator<Item = &'a Segment>) -> Self {
        Self {
            pass: 0,
            states: segments
                .into_iter()
                .map(|s| {
                    let state = SegmentState {
                        code: s.code,
                        origin: s.origin,
                        ..Default::default()
                    };
                    (s.id, state)
                })
                .collect(),
        }
    }

    pub fn state(&self, segment: SegmentId) -> Option<&SegmentState> {
        self.states.get(&segment)
    }

    pub fn code(&self, segment: SegmentId) -> Option<TypeCode> {
        self.states.get(&segment).and_then(|s| s.code)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Segments with a known code, recorded or inferred.
    pub fn known_count(&self) -> usize {
        self.states.values().filter(|s| s.code.is_some()).count()
    }

    /// Everything except the pass counter is equal.
    pub fn same_content(&self, other: &Snapshot) -> bool {
        self.states == other.states
    }
}

/// Statistics for one pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassReport {
    /// Pass number (1-based).
    pub pass: u32,
    /// Endpoints that received a code.
    pub resolved_endpoints: usize,
    /// Endpoints left unresolved because neighbors disagree.
    pub conflicts: usize,
    /// Segments that gained a code in this pass.
    pub newly_inferred: usize,
    /// Whether the output differs from the input snapshot.
    pub changed: bool,
    /// Deciding rule → number of endpoints it decided.
    pub rule_hits: BTreeMap<String, usize>,
    pub duration: Duration,
}

/// Output of [`MaterialInference::run_pass`].
#[derive(Debug, Clone)]
pub struct PassOutcome {
    pub snapshot: Snapshot,
    pub changed: bool,
    pub report: PassReport,
    /// Ambiguous endpoints found in this pass.
    pub conflicts: Vec<FlaggedSegment>,
}

/// Output of [`MaterialInference::converge`].
#[derive(Debug, Clone)]
pub struct Convergence {
    pub snapshot: Snapshot,
    pub reports: Vec<PassReport>,
    /// Ambiguous endpoints as of the last pass.
    pub conflicts: Vec<FlaggedSegment>,
    /// Whether the criterion was met before the pass limit.
    pub converged: bool,
}

impl Convergence {
    pub fn passes(&self) -> usize {
        self.reports.len()
    }
}

/// Decides from the pass history whether inference has settled.
pub trait ConvergenceCriterion: Send + Sync {
    fn is_converged(&self, reports: &[PassReport]) -> bool;
}

/// Settled when the last pass changed nothing (fixed point).
#[derive(Debug, Default, Clone, Copy)]
pub struct FixedPointCriterion;

impl ConvergenceCriterion for FixedPointCriterion {
    fn is_converged(&self, reports: &[PassReport]) -> bool {
        reports.last().is_some_and(|r| !r.changed)
    }
}

/// Settled when the last pass inferred no new segment codes.
///
/// Stops one pass earlier than [`FixedPointCriterion`]; the materials of that last
/// pass are already final because they were computed from the same codes.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoNewCodesCriterion;

impl ConvergenceCriterion for NoNewCodesCriterion {
    fn is_converged(&self, reports: &[PassReport]) -> bool {
        reports.last().is_some_and(|r| r.newly_inferred == 0)
    }
}

/// The Material Inference Engine.
pub struct MaterialInference {
    rules: RuleRegistry,
    precedence: SourcePrecedence,
    criterion: Box<dyn ConvergenceCriterion>,
}

impl MaterialInference {
    pub fn new(policy: &InferencePolicy) -> Self {
        Self {
            rules: RuleRegistry::standard(policy),
            precedence: policy.precedence,
            criterion: Box::new(FixedPointCriterion),
        }
    }

    /// Replace the rule set.
    pub fn with_rules(mut self, rules: RuleRegistry) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_criterion(mut self, criterion: Box<dyn ConvergenceCriterion>) -> Self {
        self.criterion = criterion;
        self
    }

    pub fn rules(&self) -> &RuleRegistry {
        &self.rules
    }

    /// One pass: resolve every endpoint from `snapshot` and derive the next snapshot.
    pub fn run_pass(&self, index: &AdjacencyIndex, snapshot: &Snapshot) -> NetworkResult<PassOutcome> {
        let started = Instant::now();
        let pass = snapshot.pass + 1;

        let mut states = BTreeMap::new();
        let mut conflicts = Vec::new();
        let mut rule_hits: BTreeMap<String, usize> = BTreeMap::new();
        let mut resolved_endpoints = 0;
        let mut newly_inferred = 0;

        for (&segment, previous) in &snapshot.states {
            let mut resolved = [None, None];
            for (slot, end) in EndKind::BOTH.into_iter().enumerate() {
                let ctx = self.context(index, snapshot, segment, end, previous, pass)?;
                let Some((rule, outcome)) = self.rules.evaluate(&ctx)? else {
                    continue;
                };
                *rule_hits.entry(rule.name().to_string()).or_default() += 1;
                match outcome {
                    RuleOutcome::Resolve(code) => {
                        resolved[slot] = Some(code);
                        resolved_endpoints += 1;
                    }
                    RuleOutcome::Conflict(codes) => conflicts.push(FlaggedSegment {
                        segment,
                        issue: SegmentIssue::AmbiguousMaterial { end, codes },
                    }),
                    RuleOutcome::Skip => {}
                }
            }

            let [from_code, to_code] = resolved;
            let mut next = SegmentState {
                code: previous.code,
                origin: previous.origin,
                from_code,
                to_code,
                source: MaterialSource::Unset,
            };

            // Known codes are never overwritten or retracted.
            if next.code.is_none() {
                if let Some(code) = inferred_code(from_code, to_code) {
                    next.code = Some(code);
                    next.origin = CodeOrigin::Inferred;
                    newly_inferred += 1;
                }
            }
            next.source = self.source(&next, from_code.is_some() || to_code.is_some());

            states.insert(segment, next);
        }

        let changed = states != snapshot.states;
        let report = PassReport {
            pass,
            resolved_endpoints,
            conflicts: conflicts.len(),
            newly_inferred,
            changed,
            rule_hits,
            duration: started.elapsed(),
        };

        debug!(
            pass,
            resolved = report.resolved_endpoints,
            conflicts = report.conflicts,
            newly_inferred,
            changed,
            duration_ms = report.duration.as_millis() as u64,
            "pass_complete"
        );

        Ok(PassOutcome {
            snapshot: Snapshot { pass, states },
            changed,
            report,
            conflicts,
        })
    }

    /// Run passes until the convergence criterion holds or `limit` is reached.
    pub fn converge(
        &self,
        index: &AdjacencyIndex,
        initial: Snapshot,
        limit: PassLimit,
    ) -> NetworkResult<Convergence> {
        info!(
            segments = initial.len(),
            known = initial.known_count(),
            max_passes = limit.max_passes,
            "inference_start"
        );

        let mut snapshot = initial;
        let mut reports = Vec::new();
        let mut conflicts = Vec::new();
        let mut converged = false;

        for _ in 0..limit.max_passes {
            let outcome = self.run_pass(index, &snapshot)?;
            snapshot = outcome.snapshot;
            conflicts = outcome.conflicts;
            reports.push(outcome.report);

            if self.criterion.is_converged(&reports) {
                converged = true;
                if limit.stop_on_convergence {
                    break;
                }
            }
        }

        if converged {
            info!(passes = reports.len(), known = snapshot.known_count(), "inference_converged");
        } else {
            warn!(
                passes = reports.len(),
                known = snapshot.known_count(),
                "inference_pass_limit_reached"
            );
        }
        if !conflicts.is_empty() {
            warn!(endpoints = conflicts.len(), "ambiguous_materials_left_unresolved");
        }

        Ok(Convergence {
            snapshot,
            reports,
            conflicts,
            converged,
        })
    }

    fn context(
        &self,
        index: &AdjacencyIndex,
        snapshot: &Snapshot,
        segment: SegmentId,
        end: EndKind,
        state: &SegmentState,
        pass: u32,
    ) -> NetworkResult<EndpointContext> {
        let neighbors = index
            .neighbors(segment, end)
            .iter()
            .map(|&other| {
                snapshot
                    .state(other)
                    .map(|s| NeighborCode {
                        segment: other,
                        code: s.code,
                    })
                    .ok_or(NetworkError::UnknownSegment { segment: other })
            })
            .collect::<NetworkResult<Vec<_>>>()?;

        Ok(EndpointContext {
            segment,
            end,
            own_code: state.code,
            neighbors,
            pass,
        })
    }

    fn source(&self, state: &SegmentState, resolved_any: bool) -> MaterialSource {
        match (state.origin, self.precedence) {
            (CodeOrigin::Recorded, SourcePrecedence::LegacyFirst) => MaterialSource::Legacy,
            (CodeOrigin::Recorded, SourcePrecedence::AdjacencyFirst) if resolved_any => {
                MaterialSource::Adjacency
            }
            (CodeOrigin::Recorded, SourcePrecedence::AdjacencyFirst) => MaterialSource::Legacy,
            (CodeOrigin::Inferred, _) => MaterialSource::Adjacency,
            (CodeOrigin::Unknown, _) if resolved_any => MaterialSource::Adjacency,
            (CodeOrigin::Unknown, _) => MaterialSource::Unset,
        }
    }
}

/// The code an unknown segment takes from its resolved endpoints: the single
/// distinct one, or none when its ends disagree.
fn inferred_code(from: Option<TypeCode>, to: Option<TypeCode>) -> Option<TypeCode> {
    match (from, to) {
        (Some(a), Some(b)) if a != b => None,
        (Some(a), _) => Some(a),
        (None, b) => b,
    }
}
