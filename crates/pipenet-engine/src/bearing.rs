//! Bearing and compass-direction classification.
//!
//! Bearings are measured clockwise from north (the +y axis of the working frame)
//! to the start-to-end vector and normalized to `[0, 360)`. The circle is split into
//! eight 45° sectors centered on N, NE, ... NW.

use pipenet_core::{Direction, Point, SegmentId};

use crate::config::BoundaryTieBreak;
use crate::error::{NetworkError, NetworkResult};
use crate::extract::Segment;

/// Half the width of a compass sector.
const HALF_SECTOR: f64 = 22.5;

/// Width of a compass sector.
const SECTOR: f64 = 45.0;

/// Bearing of the vector `start -> end` in degrees, `[0, 360)`.
///
/// Coincident points have no bearing and are rejected.
pub fn bearing(segment: SegmentId, start: Point, end: Point) -> NetworkResult<f64> {
    if start == end {
        return Err(NetworkError::DegenerateGeometry { segment });
    }
    let dx = end.x - start.x;
    let dy = end.y - start.y;
    let degrees = (90.0 - dy.atan2(dx).to_degrees()).rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs.
    Ok(if degrees >= 360.0 { 0.0 } else { degrees })
}

/// Map a bearing to its compass sector.
///
/// Bearings exactly on a boundary go to the neighboring sector selected by `tie_break`.
/// Out-of-range inputs are wrapped first.
pub fn classify(bearing: f64, tie_break: BoundaryTieBreak) -> Direction {
    let bearing = bearing.rem_euclid(360.0);
    let shifted = (bearing + HALF_SECTOR) / SECTOR;
    let sector = match tie_break {
        BoundaryTieBreak::TowardHigher => shifted.floor() as i64,
        BoundaryTieBreak::TowardLower => shifted.ceil() as i64 - 1,
    };
    Direction::from_sector(sector)
}

/// Bearing and label for one segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Heading {
    pub bearing: f64,
    pub direction: Direction,
}

/// Classifies segments with a fixed boundary policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectionClassifier {
    tie_break: BoundaryTieBreak,
}

impl DirectionClassifier {
    pub fn new(tie_break: BoundaryTieBreak) -> Self {
        Self { tie_break }
    }

    pub fn heading(&self, segment: &Segment) -> NetworkResult<Heading> {
        let bearing = bearing(segment.id, segment.start, segment.end)?;
        Ok(Heading {
            bearing,
            direction: classify(bearing, self.tie_break),
        })
    }
}
