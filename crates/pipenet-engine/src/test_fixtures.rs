//! Minimal fixtures for engine and store tests.
//!
//! Builds in-memory line and point layers without a feature store.

use pipenet_core::{FieldValue, LineFeature, Point, PointFeature, PointId, SegmentId};

use crate::config::FieldNames;

/// Builder for small test networks.
///
/// Line ids and point ids are assigned sequentially starting at 1. Every line gets a
/// `FACILITYID` of the form `L{id}` and every point `P{id}` unless field names are changed.
pub struct NetworkBuilder {
    lines: Vec<LineFeature>,
    points: Vec<PointFeature>,
    fields: FieldNames,
    next_line: u64,
    next_point: u64,
}

impl Default for NetworkBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkBuilder {
    pub fn new() -> Self {
        Self::with_fields(FieldNames::default())
    }

    pub fn with_fields(fields: FieldNames) -> Self {
        Self {
            lines: Vec::new(),
            points: Vec::new(),
            fields,
            next_line: 1,
            next_point: 1,
        }
    }

    /// Add a straight segment. `code: None` leaves the type field null.
    pub fn add_line(&mut self, start: (f64, f64), end: (f64, f64), code: Option<i64>) -> SegmentId {
        self.add_polyline(&[start, end], code)
    }

    /// Add a segment through `vertices`.
    pub fn add_polyline(&mut self, vertices: &[(f64, f64)], code: Option<i64>) -> SegmentId {
        let id = SegmentId(self.next_line);
        self.next_line += 1;

        let mut feature = LineFeature {
            id,
            vertices: vertices.iter().map(|&(x, y)| Point::new(x, y)).collect(),
            ..Default::default()
        };
        feature
            .attributes
            .insert(self.fields.id.clone(), FieldValue::from(format!("L{}", id.0)));
        feature
            .attributes
            .insert(self.fields.type_code.clone(), FieldValue::from(code));
        self.lines.push(feature);
        id
    }

    /// Add a straight run of `count` segments, each offset by `step`.
    ///
    /// Only the first segment carries `first_code`; the rest are unknown.
    pub fn add_chain(
        &mut self,
        origin: (f64, f64),
        step: (f64, f64),
        count: usize,
        first_code: Option<i64>,
    ) -> Vec<SegmentId> {
        (0..count)
            .map(|i| {
                let start = (origin.0 + step.0 * i as f64, origin.1 + step.1 * i as f64);
                let end = (start.0 + step.0, start.1 + step.1);
                self.add_line(start, end, if i == 0 { first_code } else { None })
            })
            .collect()
    }

    /// Set an arbitrary attribute on a line added earlier.
    pub fn set_line_attribute(&mut self, id: SegmentId, name: &str, value: impl Into<FieldValue>) {
        if let Some(line) = self.lines.iter_mut().find(|l| l.id == id) {
            line.attributes.insert(name.to_string(), value.into());
        }
    }

    /// Add a point feature of type `kind`.
    pub fn add_point(&mut self, location: (f64, f64), kind: &str) -> PointId {
        let id = PointId(self.next_point);
        self.next_point += 1;

        let point = PointFeature::new(id, Point::new(location.0, location.1))
            .with_attribute(self.fields.point_id.clone(), format!("P{}", id.0))
            .with_attribute(self.fields.point_type.clone(), kind);
        self.points.push(point);
        id
    }

    pub fn lines(&self) -> &[LineFeature] {
        &self.lines
    }

    pub fn points(&self) -> &[PointFeature] {
        &self.points
    }

    /// Consume the builder, returning `(lines, points)`.
    pub fn build(self) -> (Vec<LineFeature>, Vec<PointFeature>) {
        (self.lines, self.points)
    }
}
