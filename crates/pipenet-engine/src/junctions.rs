//! Point features at the network's junctions: manholes, cleanouts and the like.
//!
//! Three lookups share one R*-tree over the point layer:
//! the nearest point at each segment endpoint, the number of points along a
//! segment, and the distinct line attribute values meeting at each point.

use std::collections::{BTreeMap, BTreeSet};

use pipenet_core::{EndKind, LineFeature, Point, PointFeature, PointId, SegmentId};
use rstar::primitives::GeomWithData;
use rstar::{RTree, AABB};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::extract::Segment;

type IndexedPoint = GeomWithData<[f64; 2], usize>;

/// A point feature matched to a segment endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointMatch {
    pub point: PointId,
    /// Value of the point id field, or the numeric id.
    pub external_id: String,
    /// Value of the point type field, if any.
    pub point_type: Option<String>,
    pub distance: f64,
}

/// Nearest points at both ends of a segment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointPoints {
    pub from: Option<PointMatch>,
    pub to: Option<PointMatch>,
}

impl EndpointPoints {
    pub fn at(&self, end: EndKind) -> Option<&PointMatch> {
        match end {
            EndKind::Start => self.from.as_ref(),
            EndKind::End => self.to.as_ref(),
        }
    }
}

/// Spatial index over a point layer.
pub struct JunctionPoints<'a> {
    points: &'a [PointFeature],
    tree: RTree<IndexedPoint>,
    tolerance: f64,
    id_field: &'a str,
    type_field: &'a str,
}

impl<'a> JunctionPoints<'a> {
    /// Index `points`. `tolerance` is the search radius for every lookup.
    pub fn new(points: &'a [PointFeature], tolerance: f64, id_field: &'a str, type_field: &'a str) -> Self {
        let tree = RTree::bulk_load(
            points
                .iter()
                .enumerate()
                .map(|(i, p)| GeomWithData::new(p.location.as_array(), i))
                .collect(),
        );
        Self {
            points,
            tree,
            tolerance,
            id_field,
            type_field,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Closest point within tolerance of `location`; equal distances go to the lowest id.
    pub fn nearest(&self, location: Point) -> Option<PointMatch> {
        self.tree
            .locate_within_distance(location.as_array(), self.tolerance * self.tolerance)
            .map(|hit| {
                let point = &self.points[hit.data];
                (point.location.distance_squared(&location), point)
            })
            .min_by(|(da, a), (db, b)| da.total_cmp(db).then_with(|| a.id.cmp(&b.id)))
            .map(|(distance_sq, point)| PointMatch {
                point: point.id,
                external_id: point
                    .attribute(self.id_field)
                    .and_then(|v| v.as_text())
                    .unwrap_or_else(|| point.id.to_string()),
                point_type: point.attribute(self.type_field).and_then(|v| v.as_text()),
                distance: distance_sq.sqrt(),
            })
    }

    /// Nearest point at each end of every segment.
    pub fn assign_endpoints(&self, segments: &[Segment]) -> BTreeMap<SegmentId, EndpointPoints> {
        let assigned: BTreeMap<_, _> = segments
            .iter()
            .map(|s| {
                (
                    s.id,
                    EndpointPoints {
                        from: self.nearest(s.start),
                        to: self.nearest(s.end),
                    },
                )
            })
            .collect();

        debug!(
            segments = assigned.len(),
            matched_ends = assigned
                .values()
                .map(|e| e.from.is_some() as usize + e.to.is_some() as usize)
                .sum::<usize>(),
            "junction_points_assigned"
        );
        assigned
    }

    /// Points within tolerance of the straight span from `start` to `end`.
    pub fn points_along(&self, start: Point, end: Point) -> Vec<PointId> {
        let t = self.tolerance;
        let envelope = AABB::from_corners(
            [start.x.min(end.x) - t, start.y.min(end.y) - t],
            [start.x.max(end.x) + t, start.y.max(end.y) + t],
        );
        let mut ids: Vec<PointId> = self
            .tree
            .locate_in_envelope(&envelope)
            .map(|hit| &self.points[hit.data])
            .filter(|p| p.location.distance_to_span(&start, &end) <= t)
            .map(|p| p.id)
            .collect();
        ids.sort();
        ids
    }

    /// Number of points connected to each segment.
    pub fn connected_point_counts(&self, segments: &[Segment]) -> BTreeMap<SegmentId, usize> {
        segments
            .iter()
            .map(|s| (s.id, self.points_along(s.start, s.end).len()))
            .collect()
    }
}

/// For every point, the distinct non-empty values of `field` on the lines whose
/// endpoints lie within `tolerance`, sorted and joined with `", "`.
///
/// Points without any touching line value map to `None`.
pub fn roll_up_line_values(
    points: &[PointFeature],
    lines: &[LineFeature],
    field: &str,
    tolerance: f64,
) -> BTreeMap<PointId, Option<String>> {
    let endpoints: Vec<GeomWithData<[f64; 2], usize>> = lines
        .iter()
        .enumerate()
        .flat_map(|(i, line)| {
            [line.start(), line.end()]
                .into_iter()
                .flatten()
                .map(move |p| GeomWithData::new(p.as_array(), i))
        })
        .collect();
    let tree = RTree::bulk_load(endpoints);
    let radius_sq = tolerance * tolerance;

    points
        .iter()
        .map(|point| {
            let values: BTreeSet<String> = tree
                .locate_within_distance(point.location.as_array(), radius_sq)
                .filter_map(|hit| lines[hit.data].attribute(field))
                .filter_map(|v| v.as_text())
                .collect();
            let joined = if values.is_empty() {
                None
            } else {
                Some(values.into_iter().collect::<Vec<_>>().join(", "))
            };
            (point.id, joined)
        })
        .collect()
}
