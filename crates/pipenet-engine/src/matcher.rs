//! Endpoint matching: clusters segment endpoints into junctions and derives adjacency.
//!
//! Every `(segment, end)` pair is a point. Points within the tolerance of each other
//! are merged with a union-find, so chains of near-coincident points collapse into a
//! single junction even when the chain's extremes are farther apart than the tolerance.
//! Candidate pairs come from an R*-tree range query; within a query radius the
//! comparison is exhaustive.

use std::collections::{BTreeSet, HashMap};

use petgraph::algo::connected_components;
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::unionfind::UnionFind;
use pipenet_core::{EndKind, Point, SegmentId};
use rstar::primitives::GeomWithData;
use rstar::RTree;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::extract::Segment;

static NO_NEIGHBORS: BTreeSet<SegmentId> = BTreeSet::new();

/// One terminus of one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EndpointRef {
    pub segment: SegmentId,
    pub end: EndKind,
}

impl EndpointRef {
    pub fn new(segment: SegmentId, end: EndKind) -> Self {
        Self { segment, end }
    }
}

/// Identifier of a junction (cluster of coincident endpoints) within one index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JunctionId(pub usize);

/// A physical node of the network: every endpoint that landed in one cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Junction {
    pub id: JunctionId,
    /// Mean position of the member endpoints.
    pub location: Point,
    pub members: Vec<EndpointRef>,
}

impl Junction {
    /// Distinct segments meeting here.
    pub fn segments(&self) -> BTreeSet<SegmentId> {
        self.members.iter().map(|m| m.segment).collect()
    }

    /// Fewer than two distinct segments meet here.
    pub fn is_dead_end(&self) -> bool {
        self.segments().len() < 2
    }
}

/// Builds an [`AdjacencyIndex`] for a fixed tolerance.
#[derive(Debug, Clone, Copy)]
pub struct EndpointMatcher {
    tolerance: f64,
}

impl EndpointMatcher {
    /// `tolerance` is assumed validated (finite, non-negative).
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Cluster all endpoints of `segments` and derive per-endpoint adjacency.
    ///
    /// Degenerate segments should be filtered out beforehand; they are indexed
    /// like any other if passed in.
    pub fn build(&self, segments: &[Segment]) -> AdjacencyIndex {
        let endpoints: Vec<(EndpointRef, Point)> = segments
            .iter()
            .flat_map(|s| {
                EndKind::BOTH
                    .into_iter()
                    .map(move |end| (EndpointRef::new(s.id, end), s.endpoint(end)))
            })
            .collect();

        let tree = RTree::bulk_load(
            endpoints
                .iter()
                .enumerate()
                .map(|(i, (_, p))| GeomWithData::new(p.as_array(), i))
                .collect(),
        );

        let radius_sq = self.tolerance * self.tolerance;
        let mut clusters = UnionFind::<usize>::new(endpoints.len());
        let mut candidate_pairs = 0usize;
        for (i, (_, point)) in endpoints.iter().enumerate() {
            for hit in tree.locate_within_distance(point.as_array(), radius_sq) {
                if hit.data > i {
                    clusters.union(i, hit.data);
                    candidate_pairs += 1;
                }
            }
        }

        // Junction ids follow the first appearance of each cluster in input order.
        let labels = clusters.into_labeling();
        let mut junction_of_root: HashMap<usize, JunctionId> = HashMap::new();
        let mut junctions: Vec<Junction> = Vec::new();
        let mut endpoint_junction = HashMap::with_capacity(endpoints.len());
        for (i, (endpoint, _)) in endpoints.iter().enumerate() {
            let id = *junction_of_root.entry(labels[i]).or_insert_with(|| {
                let id = JunctionId(junctions.len());
                junctions.push(Junction {
                    id,
                    location: Point::default(),
                    members: Vec::new(),
                });
                id
            });
            junctions[id.0].members.push(*endpoint);
            endpoint_junction.insert(*endpoint, id);
        }

        let positions: HashMap<EndpointRef, Point> = endpoints.iter().copied().collect();
        let mut neighbors: HashMap<EndpointRef, BTreeSet<SegmentId>> = HashMap::new();
        for junction in &mut junctions {
            let n = junction.members.len() as f64;
            let (sx, sy) = junction.members.iter().fold((0.0, 0.0), |(x, y), m| {
                let p = positions[m];
                (x + p.x, y + p.y)
            });
            junction.location = Point::new(sx / n, sy / n);

            let members = junction.segments();
            for endpoint in &junction.members {
                let others: BTreeSet<SegmentId> = members
                    .iter()
                    .copied()
                    .filter(|s| *s != endpoint.segment)
                    .collect();
                if !others.is_empty() {
                    neighbors.insert(*endpoint, others);
                }
            }
        }

        debug!(
            endpoints = endpoints.len(),
            candidate_pairs,
            junctions = junctions.len(),
            tolerance = self.tolerance,
            "endpoint_clusters_built"
        );

        AdjacencyIndex {
            tolerance: self.tolerance,
            segments: segments.iter().map(|s| s.id).collect(),
            junctions,
            endpoint_junction,
            neighbors,
        }
    }
}

/// Immutable adjacency over segment endpoints, built once per run.
#[derive(Debug, Clone, Default)]
pub struct AdjacencyIndex {
    tolerance: f64,
    segments: Vec<SegmentId>,
    junctions: Vec<Junction>,
    endpoint_junction: HashMap<EndpointRef, JunctionId>,
    neighbors: HashMap<EndpointRef, BTreeSet<SegmentId>>,
}

impl AdjacencyIndex {
    /// Convenience for `EndpointMatcher::new(tolerance).build(segments)`.
    pub fn build(segments: &[Segment], tolerance: f64) -> Self {
        EndpointMatcher::new(tolerance).build(segments)
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Indexed segments in input order.
    pub fn segments(&self) -> &[SegmentId] {
        &self.segments
    }

    pub fn junctions(&self) -> &[Junction] {
        &self.junctions
    }

    /// Other segments touching `segment` at `end`; empty for dead ends and unknown ids.
    pub fn neighbors(&self, segment: SegmentId, end: EndKind) -> &BTreeSet<SegmentId> {
        self.neighbors
            .get(&EndpointRef::new(segment, end))
            .unwrap_or(&NO_NEIGHBORS)
    }

    pub fn junction_of(&self, segment: SegmentId, end: EndKind) -> Option<&Junction> {
        self.endpoint_junction
            .get(&EndpointRef::new(segment, end))
            .map(|id| &self.junctions[id.0])
    }

    /// The end of `other` that sits at the same junction as `segment`'s `end`.
    pub fn shared_ends(&self, segment: SegmentId, end: EndKind, other: SegmentId) -> Vec<EndKind> {
        let Some(junction) = self.junction_of(segment, end) else {
            return Vec::new();
        };
        junction
            .members
            .iter()
            .filter(|m| m.segment == other)
            .map(|m| m.end)
            .collect()
    }

    /// Number of `(endpoint, neighbor)` relations.
    pub fn adjacency_count(&self) -> usize {
        self.neighbors.values().map(BTreeSet::len).sum()
    }

    /// Junctions where at least two segments meet.
    pub fn connection_count(&self) -> usize {
        self.junctions.iter().filter(|j| !j.is_dead_end()).count()
    }

    /// Whether every adjacency is mirrored at the same junction.
    pub fn is_symmetric(&self) -> bool {
        self.neighbors.iter().all(|(endpoint, others)| {
            others.iter().all(|other| {
                self.shared_ends(endpoint.segment, endpoint.end, *other)
                    .into_iter()
                    .any(|other_end| self.neighbors(*other, other_end).contains(&endpoint.segment))
            })
        })
    }

    /// Segments as nodes, one edge per pair of segments sharing a junction.
    pub fn to_petgraph(&self) -> (UnGraph<SegmentId, JunctionId>, HashMap<SegmentId, NodeIndex>) {
        let mut graph = UnGraph::new_undirected();
        let mut index_of = HashMap::with_capacity(self.segments.len());
        for segment in &self.segments {
            index_of.insert(*segment, graph.add_node(*segment));
        }

        for junction in &self.junctions {
            let members: Vec<SegmentId> = junction.segments().into_iter().collect();
            for (i, a) in members.iter().enumerate() {
                for b in &members[i + 1..] {
                    if let (Some(&ia), Some(&ib)) = (index_of.get(a), index_of.get(b)) {
                        graph.add_edge(ia, ib, junction.id);
                    }
                }
            }
        }

        (graph, index_of)
    }

    /// Number of disconnected sub-networks.
    pub fn component_count(&self) -> usize {
        let (graph, _) = self.to_petgraph();
        connected_components(&graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(id: u64, start: (f64, f64), end: (f64, f64)) -> Segment {
        Segment::new(
            SegmentId(id),
            Point::new(start.0, start.1),
            Point::new(end.0, end.1),
            None,
        )
    }

    fn ids(set: &BTreeSet<SegmentId>) -> Vec<u64> {
        set.iter().map(|s| s.0).collect()
    }

    #[test]
    fn test_simple_chain() {
        let segments = vec![seg(1, (0.0, 0.0), (0.0, 10.0)), seg(2, (0.0, 10.0), (0.0, 20.0))];
        let index = AdjacencyIndex::build(&segments, 0.01);

        assert_eq!(ids(index.neighbors(SegmentId(1), EndKind::End)), vec![2]);
        assert_eq!(ids(index.neighbors(SegmentId(2), EndKind::Start)), vec![1]);
        assert!(index.neighbors(SegmentId(1), EndKind::Start).is_empty());
        assert!(index.neighbors(SegmentId(2), EndKind::End).is_empty());
        assert_eq!(index.junctions().len(), 3);
        assert_eq!(index.connection_count(), 1);
        assert!(index.is_symmetric());
    }

    #[test]
    fn test_three_way_junction_with_offsets() {
        // Extremes are 0.016 apart, beyond tolerance, but chained through the middle point.
        let segments = vec![
            seg(1, (-10.0, 0.0), (0.0, 0.0)),
            seg(2, (0.008, 0.0), (0.008, 10.0)),
            seg(3, (0.016, 0.0), (10.0, 0.0)),
        ];
        let index = AdjacencyIndex::build(&segments, 0.01);

        assert_eq!(ids(index.neighbors(SegmentId(1), EndKind::End)), vec![2, 3]);
        assert_eq!(ids(index.neighbors(SegmentId(2), EndKind::Start)), vec![1, 3]);
        assert_eq!(ids(index.neighbors(SegmentId(3), EndKind::Start)), vec![1, 2]);

        let junction = index.junction_of(SegmentId(2), EndKind::Start).unwrap();
        assert_eq!(junction.members.len(), 3);
        assert!((junction.location.x - 0.008).abs() < 1e-12);
    }

    #[test]
    fn test_closed_loop_excludes_itself() {
        let segments = vec![seg(1, (0.0, 0.0), (0.0, 0.005)), seg(2, (0.0, 0.0), (5.0, 0.0))];
        let index = AdjacencyIndex::build(&segments, 0.01);

        assert_eq!(ids(index.neighbors(SegmentId(1), EndKind::Start)), vec![2]);
        assert_eq!(ids(index.neighbors(SegmentId(1), EndKind::End)), vec![2]);
        assert_eq!(ids(index.neighbors(SegmentId(2), EndKind::Start)), vec![1]);
        assert_eq!(
            index.shared_ends(SegmentId(2), EndKind::Start, SegmentId(1)),
            vec![EndKind::Start, EndKind::End]
        );
    }

    #[test]
    fn test_lone_loop_is_dead_end() {
        let segments = vec![seg(1, (0.0, 0.0), (0.0, 0.001))];
        let index = AdjacencyIndex::build(&segments, 0.01);

        assert!(index.neighbors(SegmentId(1), EndKind::Start).is_empty());
        assert!(index.junctions()[0].is_dead_end());
    }

    #[test]
    fn test_zero_tolerance_is_exact_match() {
        let segments = vec![
            seg(1, (0.0, 0.0), (1.0, 1.0)),
            seg(2, (1.0, 1.0), (2.0, 2.0)),
            seg(3, (1.0, 1.0000001), (3.0, 0.0)),
        ];
        let index = AdjacencyIndex::build(&segments, 0.0);

        assert_eq!(ids(index.neighbors(SegmentId(1), EndKind::End)), vec![2]);
        assert!(index.neighbors(SegmentId(3), EndKind::Start).is_empty());
    }

    #[test]
    fn test_tolerance_is_inclusive() {
        let segments = vec![seg(1, (0.0, 0.0), (1.0, 0.0)), seg(2, (1.5, 0.0), (3.0, 0.0))];

        assert!(AdjacencyIndex::build(&segments, 0.4)
            .neighbors(SegmentId(1), EndKind::End)
            .is_empty());
        assert_eq!(
            ids(AdjacencyIndex::build(&segments, 0.5).neighbors(SegmentId(1), EndKind::End)),
            vec![2]
        );
    }

    #[test]
    fn test_components_counted_with_petgraph() {
        let segments = vec![
            seg(1, (0.0, 0.0), (1.0, 0.0)),
            seg(2, (1.0, 0.0), (2.0, 0.0)),
            seg(3, (50.0, 50.0), (60.0, 50.0)),
        ];
        let index = AdjacencyIndex::build(&segments, 0.01);

        let (graph, _) = index.to_petgraph();
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(index.component_count(), 2);
    }

    #[test]
    fn test_empty_input() {
        let index = AdjacencyIndex::build(&[], 0.01);
        assert!(index.junctions().is_empty());
        assert_eq!(index.component_count(), 0);
        assert!(index.neighbors(SegmentId(9), EndKind::Start).is_empty());
    }
}
