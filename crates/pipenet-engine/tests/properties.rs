//! Property tests over randomly generated networks.

use pipenet_engine::pipenet_core::{Direction, EndKind, Point, SegmentId, TypeCode};
use pipenet_engine::{
    bearing, classify, AdjacencyIndex, BoundaryTieBreak, InferencePolicy, MaterialInference,
    PassLimit, Segment, Snapshot,
};
use proptest::prelude::*;

/// Coarse coordinates so that endpoints often coincide or nearly coincide.
fn arb_coord() -> impl Strategy<Value = f64> {
    (0i32..8, 0u8..4).prop_map(|(whole, jitter)| whole as f64 + jitter as f64 * 0.2)
}

fn arb_point() -> impl Strategy<Value = Point> {
    (arb_coord(), arb_coord()).prop_map(|(x, y)| Point::new(x, y))
}

fn arb_network() -> impl Strategy<Value = Vec<Segment>> {
    prop::collection::vec((arb_point(), arb_point(), prop::option::of(1i64..4)), 1..30).prop_map(
        |raw| {
            raw.into_iter()
                .enumerate()
                .filter(|(_, (start, end, _))| start != end)
                .map(|(i, (start, end, code))| {
                    Segment::new(SegmentId(i as u64 + 1), start, end, code.map(TypeCode))
                })
                .collect()
        },
    )
}

fn arb_tie_break() -> impl Strategy<Value = BoundaryTieBreak> {
    prop_oneof![
        Just(BoundaryTieBreak::TowardHigher),
        Just(BoundaryTieBreak::TowardLower)
    ]
}

proptest! {
    #[test]
    fn adjacency_is_symmetric(segments in arb_network(), tolerance in 0.0f64..0.5) {
        let index = AdjacencyIndex::build(&segments, tolerance);
        prop_assert!(index.is_symmetric());

        for segment in &segments {
            for end in EndKind::BOTH {
                for other in index.neighbors(segment.id, end) {
                    let mirrored = index
                        .shared_ends(segment.id, end, *other)
                        .into_iter()
                        .any(|other_end| index.neighbors(*other, other_end).contains(&segment.id));
                    prop_assert!(mirrored, "{} -> {} not mirrored", segment.id, other);
                }
            }
        }
    }

    #[test]
    fn no_segment_is_its_own_neighbor(segments in arb_network(), tolerance in 0.0f64..3.0) {
        let index = AdjacencyIndex::build(&segments, tolerance);
        for segment in &segments {
            for end in EndKind::BOTH {
                prop_assert!(!index.neighbors(segment.id, end).contains(&segment.id));
            }
        }
    }

    #[test]
    fn larger_tolerance_never_removes_adjacency(
        segments in arb_network(),
        small in 0.0f64..0.4,
        extra in 0.0f64..0.4,
    ) {
        let narrow = AdjacencyIndex::build(&segments, small);
        let wide = AdjacencyIndex::build(&segments, small + extra);
        for segment in &segments {
            for end in EndKind::BOTH {
                let before = narrow.neighbors(segment.id, end);
                let after = wide.neighbors(segment.id, end);
                prop_assert!(before.is_subset(after));
            }
        }
    }

    #[test]
    fn direction_is_deterministic(
        start in arb_point(),
        end in arb_point(),
        tie_break in arb_tie_break(),
    ) {
        prop_assume!(start != end);
        let b1 = bearing(SegmentId(1), start, end).unwrap();
        let b2 = bearing(SegmentId(1), start, end).unwrap();
        prop_assert!((0.0..360.0).contains(&b1));
        prop_assert_eq!(b1, b2);
        prop_assert_eq!(classify(b1, tie_break), classify(b2, tie_break));
    }

    #[test]
    fn boundaries_are_stable(sector in 0usize..8, tie_break in arb_tie_break()) {
        let boundary = Direction::ALL[sector].center_degrees() + 22.5;
        let first = classify(boundary, tie_break);
        prop_assert_eq!(first, classify(boundary, tie_break));
        prop_assert_eq!(Direction::ALL[sector].center_degrees(), sector as f64 * 45.0);
    }

    #[test]
    fn inference_reaches_fixed_point(segments in arb_network(), tolerance in 0.0f64..0.5) {
        let index = AdjacencyIndex::build(&segments, tolerance);
        let engine = MaterialInference::new(&InferencePolicy::default());
        // Codes are only ever added, so the fixed point comes within n + 2 passes.
        let limit = PassLimit::until_converged(segments.len() + 2);

        let settled = engine
            .converge(&index, Snapshot::from_segments(&segments), limit)
            .unwrap();
        prop_assert!(settled.converged);

        let again = engine.run_pass(&index, &settled.snapshot).unwrap();
        prop_assert!(!again.changed);
        prop_assert!(again.snapshot.same_content(&settled.snapshot));
    }

    #[test]
    fn conflicting_neighbors_are_never_guessed(segments in arb_network(), tolerance in 0.0f64..0.5) {
        let index = AdjacencyIndex::build(&segments, tolerance);
        let engine = MaterialInference::new(&InferencePolicy::default());
        let snapshot = Snapshot::from_segments(&segments);

        let outcome = engine.run_pass(&index, &snapshot).unwrap();
        for segment in &segments {
            for end in EndKind::BOTH {
                let codes: std::collections::BTreeSet<TypeCode> = index
                    .neighbors(segment.id, end)
                    .iter()
                    .filter_map(|n| snapshot.code(*n))
                    .collect();
                if codes.len() > 1 {
                    let state = outcome.snapshot.state(segment.id).unwrap();
                    prop_assert_eq!(state.endpoint_code(end), None);
                }
            }
        }
    }

    #[test]
    fn recorded_codes_are_never_overwritten(segments in arb_network()) {
        let index = AdjacencyIndex::build(&segments, 0.25);
        let engine = MaterialInference::new(&InferencePolicy::default());
        let settled = engine
            .converge(&index, Snapshot::from_segments(&segments), PassLimit::default())
            .unwrap();

        for segment in segments.iter().filter(|s| s.code.is_some()) {
            prop_assert_eq!(settled.snapshot.code(segment.id), segment.code);
        }
    }
}
