//! Core domain types shared across the pipenet workspace.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Identifiers
// =============================================================================

/// Identifier of a line feature (one pipe segment) as assigned by the feature store.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SegmentId(pub u64);

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a point feature (manhole, cleanout, fitting ...).
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct PointId(pub u64);

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Geometry
// =============================================================================

/// A 2D coordinate in the projected working frame.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to `other`.
    pub fn distance_squared(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// Euclidean distance to `other`.
    pub fn distance(&self, other: &Point) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// Shortest distance from this point to the closed span `a`..`b`.
    pub fn distance_to_span(&self, a: &Point, b: &Point) -> f64 {
        let (vx, vy) = (b.x - a.x, b.y - a.y);
        let len_sq = vx * vx + vy * vy;
        if len_sq == 0.0 {
            return self.distance(a);
        }
        let t = (((self.x - a.x) * vx + (self.y - a.y) * vy) / len_sq).clamp(0.0, 1.0);
        self.distance(&Point::new(a.x + t * vx, a.y + t * vy))
    }

    pub fn as_array(&self) -> [f64; 2] {
        [self.x, self.y]
    }
}

impl From<[f64; 2]> for Point {
    fn from(value: [f64; 2]) -> Self {
        Self::new(value[0], value[1])
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Which terminus of a segment an endpoint is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EndKind {
    /// The first vertex; adjacency here is written to the "from" fields.
    Start,
    /// The last vertex; adjacency here is written to the "to" fields.
    End,
}

impl EndKind {
    pub const BOTH: [EndKind; 2] = [EndKind::Start, EndKind::End];

    /// Field-name prefix used by the original attribute schema.
    pub fn label(&self) -> &'static str {
        match self {
            EndKind::Start => "from",
            EndKind::End => "to",
        }
    }
}

impl fmt::Display for EndKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Reprojection collaborator applied once per vertex at ingestion.
///
/// The engine never reprojects on its own; whatever produces features hands over
/// coordinates already in (or convertible to) a single projected frame.
pub trait CoordinateTransform: Send + Sync {
    fn transform(&self, point: Point) -> Point;
}

/// Leaves coordinates untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityTransform;

impl CoordinateTransform for IdentityTransform {
    fn transform(&self, point: Point) -> Point {
        point
    }
}

/// Constant shift, e.g. moving a local survey grid onto the working frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct OffsetTransform {
    pub dx: f64,
    pub dy: f64,
}

impl CoordinateTransform for OffsetTransform {
    fn transform(&self, point: Point) -> Point {
        Point::new(point.x + self.dx, point.y + self.dy)
    }
}

// =============================================================================
// Derived classifications
// =============================================================================

/// Cardinal / intercardinal direction of a segment, start to end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    N,
    NE,
    E,
    SE,
    S,
    SW,
    W,
    NW,
}

impl Direction {
    /// All labels clockwise from north; index `i` is centered on `i * 45°`.
    pub const ALL: [Direction; 8] = [
        Direction::N,
        Direction::NE,
        Direction::E,
        Direction::SE,
        Direction::S,
        Direction::SW,
        Direction::W,
        Direction::NW,
    ];

    /// Sector for an index, wrapping modulo 8.
    pub fn from_sector(index: i64) -> Self {
        Self::ALL[index.rem_euclid(8) as usize]
    }

    /// Bearing at the center of this direction's sector.
    pub fn center_degrees(&self) -> f64 {
        let index = Self::ALL.iter().position(|d| d == self).unwrap_or(0);
        index as f64 * 45.0
    }

    pub fn label(&self) -> &'static str {
        match self {
            Direction::N => "N",
            Direction::NE => "NE",
            Direction::E => "E",
            Direction::SE => "SE",
            Direction::S => "S",
            Direction::SW => "SW",
            Direction::W => "W",
            Direction::NW => "NW",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|d| d.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown direction label: {s}"))
    }
}

/// Provenance of a segment's material values.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MaterialSource {
    /// Nothing known about the segment's material.
    #[default]
    Unset,
    /// Filled in from neighboring segments.
    Adjacency,
    /// The segment carried a known type code before inference.
    Legacy,
}

impl MaterialSource {
    /// Attribute value written to the store; `None` for unset.
    pub fn label(&self) -> Option<&'static str> {
        match self {
            MaterialSource::Unset => None,
            MaterialSource::Adjacency => Some("Adjacency"),
            MaterialSource::Legacy => Some("Legacy"),
        }
    }
}

impl fmt::Display for MaterialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label().unwrap_or("unset"))
    }
}

/// Material/type code as recorded in the feature store (e.g. 1 = PVC).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TypeCode(pub i64);

impl fmt::Display for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Feature store records
// =============================================================================

/// A single attribute value as held by the feature store.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    #[default]
    Null,
    Integer(i64),
    Double(f64),
    Text(String),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Interpret the value as an integer code, if it is one.
    ///
    /// Integral doubles and numeric text count; anything else (including
    /// placeholders like `"N/A"`) does not.
    pub fn as_code(&self) -> Option<i64> {
        match self {
            FieldValue::Null => None,
            FieldValue::Integer(v) => Some(*v),
            FieldValue::Double(v) if v.is_finite() && v.fract() == 0.0 => Some(*v as i64),
            FieldValue::Double(_) => None,
            FieldValue::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Text rendering, `None` for nulls and empty strings.
    pub fn as_text(&self) -> Option<String> {
        match self {
            FieldValue::Null => None,
            FieldValue::Text(s) if s.trim().is_empty() => None,
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => Ok(()),
            FieldValue::Integer(v) => write!(f, "{v}"),
            FieldValue::Double(v) => write!(f, "{v}"),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Double(v)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

/// Storage type of an attribute field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    Text,
    Double,
    Integer,
}

/// Declaration of an attribute field on a layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    /// Maximum length for text fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
}

impl FieldSpec {
    /// Text field with the default width used for derived attributes.
    pub fn text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Text,
            length: Some(50),
        }
    }

    pub fn double(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Double,
            length: None,
        }
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Integer,
            length: None,
        }
    }
}

/// Attribute bag keyed by field name.
pub type Attributes = BTreeMap<String, FieldValue>;

/// A line feature as read from the feature store.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineFeature {
    pub id: SegmentId,
    /// Polyline vertices; the first is the start point and the last the end point.
    pub vertices: Vec<Point>,
    #[serde(default)]
    pub attributes: Attributes,
}

impl LineFeature {
    /// Straight two-vertex line.
    pub fn new(id: SegmentId, start: Point, end: Point) -> Self {
        Self {
            id,
            vertices: vec![start, end],
            attributes: Attributes::new(),
        }
    }

    /// Set an attribute (builder pattern).
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&FieldValue> {
        self.attributes.get(name)
    }

    pub fn start(&self) -> Option<Point> {
        self.vertices.first().copied()
    }

    pub fn end(&self) -> Option<Point> {
        self.vertices.last().copied()
    }
}

/// A point feature as read from the feature store.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointFeature {
    pub id: PointId,
    pub location: Point,
    #[serde(default)]
    pub attributes: Attributes,
}

impl PointFeature {
    pub fn new(id: PointId, location: Point) -> Self {
        Self {
            id,
            location,
            attributes: Attributes::new(),
        }
    }

    /// Set an attribute (builder pattern).
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&FieldValue> {
        self.attributes.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_to_span_clamps_to_endpoints() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(10.0, 0.0);

        assert_eq!(Point::new(5.0, 3.0).distance_to_span(&a, &b), 3.0);
        assert_eq!(Point::new(-4.0, 3.0).distance_to_span(&a, &b), 5.0);
        assert_eq!(Point::new(2.0, 2.0).distance_to_span(&a, &a), 8f64.sqrt());
    }

    #[test]
    fn test_direction_sectors_wrap() {
        assert_eq!(Direction::from_sector(0), Direction::N);
        assert_eq!(Direction::from_sector(8), Direction::N);
        assert_eq!(Direction::from_sector(-1), Direction::NW);
        assert_eq!(Direction::SW.center_degrees(), 225.0);
        assert_eq!("ne".parse::<Direction>().unwrap(), Direction::NE);
        assert!("north".parse::<Direction>().is_err());
    }

    #[test]
    fn test_field_value_codes() {
        assert_eq!(FieldValue::Integer(3).as_code(), Some(3));
        assert_eq!(FieldValue::Double(5.0).as_code(), Some(5));
        assert_eq!(FieldValue::Double(5.5).as_code(), None);
        assert_eq!(FieldValue::from(" 2 ").as_code(), Some(2));
        assert_eq!(FieldValue::from("N/A").as_code(), None);
        assert_eq!(FieldValue::Null.as_code(), None);
    }

    #[test]
    fn test_field_value_json_shape() {
        let attrs: Attributes = serde_json::from_str(
            r#"{"PIPE_TYPE": 1, "LENGTH": 12.5, "FACILITYID": "SL-1", "NOTE": null}"#,
        )
        .unwrap();

        assert_eq!(attrs["PIPE_TYPE"], FieldValue::Integer(1));
        assert_eq!(attrs["LENGTH"], FieldValue::Double(12.5));
        assert_eq!(attrs["FACILITYID"], FieldValue::from("SL-1"));
        assert!(attrs["NOTE"].is_null());
    }

    #[test]
    fn test_material_source_labels() {
        assert_eq!(MaterialSource::Unset.label(), None);
        assert_eq!(MaterialSource::Legacy.label(), Some("Legacy"));
        assert_eq!(MaterialSource::Adjacency.to_string(), "Adjacency");
    }
}
