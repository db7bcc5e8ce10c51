//! Geometry extraction: line features in, immutable [`Segment`] records out.

use std::collections::{BTreeSet, HashSet};

use pipenet_core::{
    CoordinateTransform, EndKind, IdentityTransform, LineFeature, Point, SegmentId, TypeCode,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::EnrichConfig;
use crate::error::{NetworkError, NetworkResult};
use crate::inference::CodeOrigin;
use crate::issue::{FlaggedSegment, SegmentIssue};

/// One pipe segment as seen by the engine.
///
/// Geometry and `code` are a snapshot taken at extraction; nothing downstream mutates them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: SegmentId,
    /// Value of the configured id field, or the numeric id when that is empty.
    pub external_id: String,
    pub start: Point,
    pub end: Point,
    /// Type code at extraction; `None` when unknown.
    pub code: Option<TypeCode>,
    /// Whether `code` was recorded or written back by an earlier run.
    #[serde(default)]
    pub origin: CodeOrigin,
}

impl Segment {
    pub fn new(id: SegmentId, start: Point, end: Point, code: Option<TypeCode>) -> Self {
        Self {
            id,
            external_id: id.to_string(),
            start,
            end,
            code,
            origin: if code.is_some() {
                CodeOrigin::Recorded
            } else {
                CodeOrigin::Unknown
            },
        }
    }

    pub fn endpoint(&self, end: EndKind) -> Point {
        match end {
            EndKind::Start => self.start,
            EndKind::End => self.end,
        }
    }

    /// Zero-length segments have no direction and take no part in adjacency.
    pub fn is_degenerate(&self) -> bool {
        self.start == self.end
    }

    pub fn length(&self) -> f64 {
        self.start.distance(&self.end)
    }
}

/// Output of the extractor.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Segments with a usable, non-zero-length span.
    pub segments: Vec<Segment>,
    /// Zero-length segments, kept so their own code still reaches the output.
    pub degenerate: Vec<Segment>,
    /// Features that could not be turned into a segment at all.
    pub flagged: Vec<FlaggedSegment>,
    /// Codes present in the input without a material mapping (tolerated by policy).
    pub unmapped_codes: BTreeSet<TypeCode>,
}

impl Extraction {
    pub fn total(&self) -> usize {
        self.segments.len() + self.degenerate.len() + self.flagged.len()
    }
}

/// Reads start/end points and type codes from line features.
pub struct GeometryExtractor<'a> {
    config: &'a EnrichConfig,
    transform: &'a dyn CoordinateTransform,
}

impl<'a> GeometryExtractor<'a> {
    pub fn new(config: &'a EnrichConfig) -> Self {
        Self {
            config,
            transform: &IdentityTransform,
        }
    }

    /// Apply a reprojection to every vertex on the way in.
    pub fn with_transform(mut self, transform: &'a dyn CoordinateTransform) -> Self {
        self.transform = transform;
        self
    }

    /// Extract all features.
    ///
    /// Fails before producing anything when two features share an id, or when the
    /// input carries type codes the material table cannot map and the policy
    /// rejects them.
    pub fn extract(&self, features: &[LineFeature]) -> NetworkResult<Extraction> {
        let mut seen = HashSet::with_capacity(features.len());
        if let Some(feature) = features.iter().find(|f| !seen.insert(f.id)) {
            return Err(NetworkError::DuplicateSegment {
                segment: feature.id,
            });
        }

        let present = features
            .iter()
            .filter_map(|f| self.code_with_origin(f).map(|(code, _)| code));
        let unmapped = self
            .config
            .materials
            .check_codes(present, self.config.unmapped_codes)?;

        let mut extraction = Extraction {
            unmapped_codes: unmapped,
            ..Default::default()
        };

        for feature in features {
            let (Some(start), Some(end)) = (feature.start(), feature.end()) else {
                extraction.flagged.push(FlaggedSegment {
                    segment: feature.id,
                    issue: SegmentIssue::MissingGeometry,
                });
                continue;
            };
            if feature.vertices.len() < 2 {
                extraction.flagged.push(FlaggedSegment {
                    segment: feature.id,
                    issue: SegmentIssue::MissingGeometry,
                });
                continue;
            }

            let (code, origin) = match self.code_with_origin(feature) {
                Some((code, origin)) if !extraction.unmapped_codes.contains(&code) => {
                    (Some(code), origin)
                }
                _ => (None, CodeOrigin::Unknown),
            };

            let segment = Segment {
                id: feature.id,
                external_id: self.external_id(feature),
                start: self.transform.transform(start),
                end: self.transform.transform(end),
                code,
                origin,
            };

            if segment.is_degenerate() {
                warn!(segment = %segment.id, "degenerate_segment");
                extraction.degenerate.push(segment);
            } else {
                extraction.segments.push(segment);
            }
        }

        if !extraction.unmapped_codes.is_empty() {
            warn!(
                codes = ?extraction.unmapped_codes,
                "unmapped_type_codes_treated_as_unknown"
            );
        }
        debug!(
            usable = extraction.segments.len(),
            degenerate = extraction.degenerate.len(),
            skipped = extraction.flagged.len(),
            "geometry_extracted"
        );

        Ok(extraction)
    }

    /// The recorded code, or else the code a previous run inferred and wrote back.
    fn code_with_origin(&self, feature: &LineFeature) -> Option<(TypeCode, CodeOrigin)> {
        let fields = &self.config.fields;
        self.known_code(feature, &fields.type_code)
            .map(|c| (c, CodeOrigin::Recorded))
            .or_else(|| {
                self.known_code(feature, &fields.inferred_code)
                    .map(|c| (c, CodeOrigin::Inferred))
            })
    }

    fn known_code(&self, feature: &LineFeature, field: &str) -> Option<TypeCode> {
        feature
            .attribute(field)
            .and_then(|v| v.as_code())
            .map(TypeCode)
            .filter(|c| !self.config.is_unknown_code(*c))
    }

    fn external_id(&self, feature: &LineFeature) -> String {
        feature
            .attribute(&self.config.fields.id)
            .and_then(|v| v.as_text())
            .unwrap_or_else(|| feature.id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UnmappedCodePolicy;
    use crate::error::NetworkError;
    use pipenet_core::{FieldValue, OffsetTransform};

    fn line(id: u64, start: (f64, f64), end: (f64, f64), code: FieldValue) -> LineFeature {
        LineFeature::new(
            SegmentId(id),
            Point::new(start.0, start.1),
            Point::new(end.0, end.1),
        )
        .with_attribute("PIPE_TYPE", code)
    }

    #[test]
    fn test_extracts_first_and_last_vertex() {
        let config = EnrichConfig::default();
        let mut feature = line(1, (0.0, 0.0), (5.0, 5.0), FieldValue::Integer(1));
        feature.vertices.insert(1, Point::new(2.0, 9.0));

        let extraction = GeometryExtractor::new(&config).extract(&[feature]).unwrap();

        let segment = &extraction.segments[0];
        assert_eq!(segment.start, Point::new(0.0, 0.0));
        assert_eq!(segment.end, Point::new(5.0, 5.0));
        assert_eq!(segment.code, Some(TypeCode(1)));
        assert_eq!(segment.external_id, "1");
    }

    #[test]
    fn test_unknown_codes_normalized() {
        let config = EnrichConfig::default();
        let features = vec![
            line(1, (0.0, 0.0), (1.0, 0.0), FieldValue::Integer(0)),
            line(2, (1.0, 0.0), (2.0, 0.0), FieldValue::from("N/A")),
            line(3, (2.0, 0.0), (3.0, 0.0), FieldValue::Null),
            line(4, (3.0, 0.0), (4.0, 0.0), FieldValue::from("5")),
        ];

        let extraction = GeometryExtractor::new(&config).extract(&features).unwrap();
        let codes: Vec<_> = extraction.segments.iter().map(|s| s.code).collect();

        assert_eq!(codes, vec![None, None, None, Some(TypeCode(5))]);
    }

    #[test]
    fn test_degenerate_and_missing_geometry_flagged() {
        let config = EnrichConfig::default();
        let empty = LineFeature {
            id: SegmentId(3),
            ..Default::default()
        };
        let features = vec![
            line(1, (0.0, 0.0), (1.0, 0.0), FieldValue::Null),
            line(2, (4.0, 4.0), (4.0, 4.0), FieldValue::Integer(2)),
            empty,
        ];

        let extraction = GeometryExtractor::new(&config).extract(&features).unwrap();

        assert_eq!(extraction.segments.len(), 1);
        assert_eq!(extraction.degenerate[0].id, SegmentId(2));
        assert_eq!(extraction.degenerate[0].code, Some(TypeCode(2)));
        assert_eq!(
            extraction.flagged,
            vec![FlaggedSegment {
                segment: SegmentId(3),
                issue: SegmentIssue::MissingGeometry
            }]
        );
        assert_eq!(extraction.total(), 3);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let config = EnrichConfig::default();
        let features = vec![
            line(1, (0.0, 0.0), (0.0, 10.0), FieldValue::Integer(1)),
            line(1, (0.0, 10.0), (0.0, 20.0), FieldValue::Null),
        ];

        let result = GeometryExtractor::new(&config).extract(&features);
        assert!(matches!(
            result,
            Err(NetworkError::DuplicateSegment {
                segment: SegmentId(1)
            })
        ));
    }

    #[test]
    fn test_written_back_code_is_inferred() {
        let config = EnrichConfig::default();
        let features = vec![
            line(1, (0.0, 0.0), (1.0, 0.0), FieldValue::Integer(1)),
            line(2, (1.0, 0.0), (2.0, 0.0), FieldValue::Null)
                .with_attribute("Inferred_Code", 1i64),
            // A recorded code wins over one written back later.
            line(3, (2.0, 0.0), (3.0, 0.0), FieldValue::Integer(2))
                .with_attribute("Inferred_Code", 1i64),
        ];

        let extraction = GeometryExtractor::new(&config).extract(&features).unwrap();
        let codes: Vec<_> = extraction
            .segments
            .iter()
            .map(|s| (s.code, s.origin))
            .collect();

        assert_eq!(
            codes,
            vec![
                (Some(TypeCode(1)), CodeOrigin::Recorded),
                (Some(TypeCode(1)), CodeOrigin::Inferred),
                (Some(TypeCode(2)), CodeOrigin::Recorded),
            ]
        );
    }

    #[test]
    fn test_unmapped_code_rejected_by_default() {
        let config = EnrichConfig::default();
        let features = vec![line(1, (0.0, 0.0), (1.0, 0.0), FieldValue::Integer(42))];

        let result = GeometryExtractor::new(&config).extract(&features);
        assert!(matches!(result, Err(NetworkError::Configuration { .. })));
    }

    #[test]
    fn test_unmapped_code_tolerated_as_unknown() {
        let config = EnrichConfig {
            unmapped_codes: UnmappedCodePolicy::TreatAsUnknown,
            ..Default::default()
        };
        let features = vec![line(1, (0.0, 0.0), (1.0, 0.0), FieldValue::Integer(42))];

        let extraction = GeometryExtractor::new(&config).extract(&features).unwrap();
        assert_eq!(extraction.segments[0].code, None);
        assert!(extraction.unmapped_codes.contains(&TypeCode(42)));
    }

    #[test]
    fn test_transform_and_external_id() {
        let config = EnrichConfig::default();
        let shift = OffsetTransform { dx: 100.0, dy: -5.0 };
        let feature = line(7, (0.0, 0.0), (1.0, 1.0), FieldValue::Null)
            .with_attribute("FACILITYID", "SL-0007");

        let extraction = GeometryExtractor::new(&config)
            .with_transform(&shift)
            .extract(&[feature])
            .unwrap();

        let segment = &extraction.segments[0];
        assert_eq!(segment.start, Point::new(100.0, -5.0));
        assert_eq!(segment.end, Point::new(101.0, -4.0));
        assert_eq!(segment.external_id, "SL-0007");
    }
}
