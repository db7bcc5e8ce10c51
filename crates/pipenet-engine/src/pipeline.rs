//! End-to-end enrichment: extract, match endpoints, classify, infer, assemble records.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use pipenet_core::{
    CoordinateTransform, Direction, EndKind, IdentityTransform, LineFeature, MaterialSource,
    PointFeature, SegmentId, TypeCode,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::bearing::DirectionClassifier;
use crate::config::{EnrichConfig, UnmappedCodePolicy};
use crate::error::NetworkResult;
use crate::extract::{Extraction, GeometryExtractor, Segment};
use crate::inference::{CodeOrigin, Convergence, MaterialInference, PassReport, Snapshot};
use crate::issue::{FlaggedSegment, SegmentIssue};
use crate::junctions::{EndpointPoints, JunctionPoints};
use crate::matcher::{AdjacencyIndex, EndpointMatcher};

/// Derived attributes of one input feature.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentRecord {
    pub id: SegmentId,
    pub external_id: String,
    pub from_adjacent: BTreeSet<SegmentId>,
    pub to_adjacent: BTreeSet<SegmentId>,
    /// External ids of `from_adjacent`, sorted.
    pub from_adjacent_ids: Vec<String>,
    /// External ids of `to_adjacent`, sorted.
    pub to_adjacent_ids: Vec<String>,
    pub bearing: Option<f64>,
    pub direction: Option<Direction>,
    pub material_source: MaterialSource,
    pub from_material: Option<String>,
    pub to_material: Option<String>,
    /// Code after the last pass: recorded or inferred.
    pub code: Option<TypeCode>,
    pub code_origin: CodeOrigin,
    pub issues: Vec<SegmentIssue>,
}

impl SegmentRecord {
    pub fn adjacent(&self, end: EndKind) -> &BTreeSet<SegmentId> {
        match end {
            EndKind::Start => &self.from_adjacent,
            EndKind::End => &self.to_adjacent,
        }
    }

    pub fn material(&self, end: EndKind) -> Option<&str> {
        match end {
            EndKind::Start => self.from_material.as_deref(),
            EndKind::End => self.to_material.as_deref(),
        }
    }

    /// Nothing could be derived; every output field should be cleared.
    pub fn is_skipped(&self) -> bool {
        self.issues.contains(&SegmentIssue::MissingGeometry)
    }

    /// The code a pass filled in, if this segment had none of its own.
    pub fn inferred_code(&self) -> Option<TypeCode> {
        self.code.filter(|_| self.code_origin == CodeOrigin::Inferred)
    }
}

/// Serializable digest of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub features: usize,
    pub segments: usize,
    pub degenerate: usize,
    pub skipped: usize,
    pub junctions: usize,
    pub connections: usize,
    pub adjacencies: usize,
    pub components: usize,
    pub passes: usize,
    pub converged: bool,
    pub known_codes: usize,
    pub ambiguous_endpoints: usize,
    pub unmapped_codes: Vec<TypeCode>,
    pub pass_reports: Vec<PassReport>,
}

/// Full output of [`Enricher::enrich`].
#[derive(Debug, Clone)]
pub struct Enrichment {
    /// One record per input feature, in input order.
    pub records: Vec<SegmentRecord>,
    pub index: AdjacencyIndex,
    pub convergence: Convergence,
    pub component_count: usize,
    pub extraction: Extraction,
}

impl Enrichment {
    pub fn record(&self, id: SegmentId) -> Option<&SegmentRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Every per-segment issue, in record order.
    pub fn issues(&self) -> Vec<FlaggedSegment> {
        self.records
            .iter()
            .flat_map(|r| {
                r.issues.iter().map(|issue| FlaggedSegment {
                    segment: r.id,
                    issue: issue.clone(),
                })
            })
            .collect()
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            features: self.records.len(),
            segments: self.extraction.segments.len(),
            degenerate: self.extraction.degenerate.len(),
            skipped: self.extraction.flagged.len(),
            junctions: self.index.junctions().len(),
            connections: self.index.connection_count(),
            adjacencies: self.index.adjacency_count(),
            components: self.component_count,
            passes: self.convergence.passes(),
            converged: self.convergence.converged,
            known_codes: self.convergence.snapshot.known_count(),
            ambiguous_endpoints: self.convergence.conflicts.len(),
            unmapped_codes: self.extraction.unmapped_codes.iter().copied().collect(),
            pass_reports: self.convergence.reports.clone(),
        }
    }
}

/// Points found at segment ends and along segments.
#[derive(Debug, Clone, Default)]
pub struct JunctionReport {
    pub endpoints: BTreeMap<SegmentId, EndpointPoints>,
    pub connected_counts: BTreeMap<SegmentId, usize>,
}

/// Runs the whole engine against one configuration.
pub struct Enricher<'a> {
    config: &'a EnrichConfig,
    transform: &'a dyn CoordinateTransform,
}

impl<'a> Enricher<'a> {
    /// Validates `config` up front so nothing is computed with a bad configuration.
    pub fn new(config: &'a EnrichConfig) -> NetworkResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            transform: &IdentityTransform,
        })
    }

    pub fn with_transform(mut self, transform: &'a dyn CoordinateTransform) -> Self {
        self.transform = transform;
        self
    }

    pub fn config(&self) -> &EnrichConfig {
        self.config
    }

    /// Compute adjacency, direction and materials for every feature.
    pub fn enrich(&self, features: &[LineFeature]) -> NetworkResult<Enrichment> {
        let config = self.config;
        info!(
            features = features.len(),
            tolerance = config.tolerance,
            max_passes = config.passes.max_passes,
            "enrich_start"
        );
        if config.tolerance == 0.0 {
            warn!("exact_coordinate_matching");
        }

        let extraction = GeometryExtractor::new(config)
            .with_transform(self.transform)
            .extract(features)?;

        let index = EndpointMatcher::new(config.tolerance).build(&extraction.segments);
        let component_count = index.component_count();

        let classifier = DirectionClassifier::new(config.policy.tie_break);
        let initial = Snapshot::from_segments(extraction.segments.iter().chain(&extraction.degenerate));
        let convergence =
            MaterialInference::new(&config.policy).converge(&index, initial, config.passes)?;

        let external: HashMap<SegmentId, &str> = extraction
            .segments
            .iter()
            .chain(&extraction.degenerate)
            .map(|s| (s.id, s.external_id.as_str()))
            .collect();
        let by_id: HashMap<SegmentId, &Segment> = extraction
            .segments
            .iter()
            .chain(&extraction.degenerate)
            .map(|s| (s.id, s))
            .collect();

        let mut issues: HashMap<SegmentId, Vec<SegmentIssue>> = HashMap::new();
        for flagged in extraction.flagged.iter().chain(&convergence.conflicts) {
            issues
                .entry(flagged.segment)
                .or_default()
                .push(flagged.issue.clone());
        }
        for segment in &extraction.degenerate {
            issues
                .entry(segment.id)
                .or_default()
                .push(SegmentIssue::DegenerateGeometry);
        }

        let records = features
            .iter()
            .map(|feature| {
                let mut record = SegmentRecord {
                    id: feature.id,
                    external_id: external
                        .get(&feature.id)
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| feature.id.to_string()),
                    issues: issues.remove(&feature.id).unwrap_or_default(),
                    ..Default::default()
                };
                let Some(segment) = by_id.get(&feature.id) else {
                    return record;
                };

                if !segment.is_degenerate() {
                    record.from_adjacent = index.neighbors(segment.id, EndKind::Start).clone();
                    record.to_adjacent = index.neighbors(segment.id, EndKind::End).clone();
                    record.from_adjacent_ids = external_ids(&record.from_adjacent, &external);
                    record.to_adjacent_ids = external_ids(&record.to_adjacent, &external);
                    match classifier.heading(segment) {
                        Ok(heading) => {
                            record.bearing = Some(heading.bearing);
                            record.direction = Some(heading.direction);
                        }
                        Err(e) => warn!(segment = %segment.id, error = %e, "heading_unavailable"),
                    }
                }

                if let Some(state) = convergence.snapshot.state(segment.id) {
                    let (from, to) = state.materials(&config.materials);
                    record.from_material = from.map(str::to_string);
                    record.to_material = to.map(str::to_string);
                    record.material_source = state.source;
                    record.code = state.code;
                    record.code_origin = state.origin;
                }
                record
            })
            .collect::<Vec<_>>();

        let enrichment = Enrichment {
            records,
            index,
            convergence,
            component_count,
            extraction,
        };

        info!(
            segments = enrichment.extraction.segments.len(),
            degenerate = enrichment.extraction.degenerate.len(),
            skipped = enrichment.extraction.flagged.len(),
            components = component_count,
            passes = enrichment.convergence.passes(),
            converged = enrichment.convergence.converged,
            "enrich_complete"
        );

        Ok(enrichment)
    }

    /// Nearest point at every segment end and point counts along every segment.
    ///
    /// Type codes play no part here, so unmapped codes are tolerated.
    pub fn junction_points(
        &self,
        lines: &[LineFeature],
        points: &[PointFeature],
    ) -> NetworkResult<JunctionReport> {
        let lenient = EnrichConfig {
            unmapped_codes: UnmappedCodePolicy::TreatAsUnknown,
            ..self.config.clone()
        };
        let extraction = GeometryExtractor::new(&lenient)
            .with_transform(self.transform)
            .extract(lines)?;
        let segments: Vec<Segment> = extraction
            .segments
            .into_iter()
            .chain(extraction.degenerate)
            .collect();

        let points: Vec<PointFeature> = points
            .iter()
            .map(|p| PointFeature {
                location: self.transform.transform(p.location),
                ..p.clone()
            })
            .collect();
        let fields = &self.config.fields;
        let index = JunctionPoints::new(
            &points,
            self.config.point_tolerance,
            &fields.point_id,
            &fields.point_type,
        );

        Ok(JunctionReport {
            endpoints: index.assign_endpoints(&segments),
            connected_counts: index.connected_point_counts(&segments),
        })
    }
}

fn external_ids(ids: &BTreeSet<SegmentId>, external: &HashMap<SegmentId, &str>) -> Vec<String> {
    let mut out: Vec<String> = ids
        .iter()
        .map(|id| {
            external
                .get(id)
                .map(|s| s.to_string())
                .unwrap_or_else(|| id.to_string())
        })
        .collect();
    out.sort();
    out
}

/// Convenience wrapper: validate `config` and enrich `features` in the working frame.
pub fn enrich(features: &[LineFeature], config: &EnrichConfig) -> NetworkResult<Enrichment> {
    Enricher::new(config)?.enrich(features)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NetworkError;
    use pipenet_core::{FieldValue, Point};

    fn line(id: u64, start: (f64, f64), end: (f64, f64), code: i64) -> LineFeature {
        LineFeature::new(
            SegmentId(id),
            Point::new(start.0, start.1),
            Point::new(end.0, end.1),
        )
        .with_attribute("PIPE_TYPE", code)
        .with_attribute("FACILITYID", format!("SL-{id:03}"))
    }

    #[test]
    fn test_records_follow_input_order() {
        let features = vec![
            line(3, (0.0, 10.0), (0.0, 20.0), 0),
            line(1, (0.0, 0.0), (0.0, 10.0), 1),
        ];
        let enrichment = enrich(&features, &EnrichConfig::default()).unwrap();

        let ids: Vec<_> = enrichment.records.iter().map(|r| r.id.0).collect();
        assert_eq!(ids, vec![3, 1]);

        let first = enrichment.record(SegmentId(3)).unwrap();
        assert_eq!(first.external_id, "SL-003");
        assert_eq!(first.from_adjacent_ids, vec!["SL-001".to_string()]);
        assert_eq!(first.from_material.as_deref(), Some("PVC"));
        assert_eq!(first.material_source, MaterialSource::Adjacency);
        assert_eq!(first.direction, Some(Direction::N));
    }

    #[test]
    fn test_invalid_config_fails_before_work() {
        let config = EnrichConfig {
            tolerance: -1.0,
            ..Default::default()
        };
        let result = enrich(&[line(1, (0.0, 0.0), (1.0, 0.0), 1)], &config);
        assert!(matches!(result, Err(NetworkError::Configuration { .. })));
    }

    #[test]
    fn test_skipped_and_degenerate_records() {
        let missing = LineFeature {
            id: SegmentId(9),
            vertices: vec![Point::new(1.0, 1.0)],
            ..Default::default()
        };
        let features = vec![
            line(1, (0.0, 0.0), (0.0, 10.0), 2),
            line(2, (0.0, 10.0), (0.0, 10.0), 3),
            missing,
        ];
        let enrichment = enrich(&features, &EnrichConfig::default()).unwrap();

        let degenerate = enrichment.record(SegmentId(2)).unwrap();
        assert_eq!(degenerate.issues, vec![SegmentIssue::DegenerateGeometry]);
        assert_eq!(degenerate.direction, None);
        assert!(degenerate.from_adjacent.is_empty());
        assert_eq!(degenerate.material_source, MaterialSource::Legacy);
        assert_eq!(degenerate.code, Some(TypeCode(3)));

        // The degenerate segment does not count as a neighbor.
        assert!(enrichment.record(SegmentId(1)).unwrap().to_adjacent.is_empty());

        let skipped = enrichment.record(SegmentId(9)).unwrap();
        assert!(skipped.is_skipped());
        assert_eq!(skipped.material_source, MaterialSource::Unset);

        let summary = enrichment.summary();
        assert_eq!(summary.features, 3);
        assert_eq!(summary.degenerate, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(enrichment.issues().len(), 2);
    }

    #[test]
    fn test_summary_counts_components() {
        let features = vec![
            line(1, (0.0, 0.0), (0.0, 10.0), 1),
            line(2, (0.0, 10.0), (0.0, 20.0), 1),
            line(3, (100.0, 0.0), (110.0, 0.0), 1),
        ];
        let summary = enrich(&features, &EnrichConfig::default()).unwrap().summary();
        assert_eq!(summary.components, 2);
        assert_eq!(summary.connections, 1);
        assert!(summary.converged);
    }

    #[test]
    fn test_junction_points_tolerate_unmapped_codes() {
        let config = EnrichConfig::default();
        let lines = vec![line(1, (0.0, 0.0), (0.0, 10.0), 77)];
        let points = vec![
            PointFeature::new(pipenet_core::PointId(5), Point::new(0.0, 10.01))
                .with_attribute("FEATURE_DE", FieldValue::from("Manhole")),
        ];

        let report = Enricher::new(&config)
            .unwrap()
            .junction_points(&lines, &points)
            .unwrap();
        let ends = &report.endpoints[&SegmentId(1)];
        assert!(ends.from.is_none());
        assert_eq!(ends.to.as_ref().unwrap().external_id, "5");
        assert_eq!(ends.to.as_ref().unwrap().point_type.as_deref(), Some("Manhole"));
        assert_eq!(report.connected_counts[&SegmentId(1)], 1);
    }
}
