//! Translation of engine output into attribute updates.
//!
//! The writer only builds [`FeatureUpdate`]s and the field declarations they need;
//! persisting them is the store's job.

use std::collections::BTreeMap;

use pipenet_core::{Attributes, EndKind, FieldSpec, FieldValue, LineFeature, PointId};
use pipenet_engine::{FieldNames, JunctionReport, PointMatch, SegmentRecord};

use crate::layer::FeatureUpdate;

/// Width of text fields holding joined id lists.
const LIST_FIELD_LENGTH: u32 = 255;

/// Builds output schemas and attribute updates for a set of field names.
#[derive(Debug, Clone, Copy)]
pub struct Writer<'a> {
    fields: &'a FieldNames,
}

impl<'a> Writer<'a> {
    pub fn new(fields: &'a FieldNames) -> Self {
        Self { fields }
    }

    /// Fields written by an enrichment run.
    pub fn enrichment_fields(&self) -> Vec<FieldSpec> {
        let f = self.fields;
        vec![
            list_field(&f.from_adjacent),
            list_field(&f.to_adjacent),
            FieldSpec::double(&f.bearing),
            FieldSpec::text(&f.direction),
            FieldSpec::text(&f.material_source),
            FieldSpec::text(&f.from_material),
            FieldSpec::text(&f.to_material),
            FieldSpec::integer(&f.inferred_code),
        ]
    }

    /// Fields written by endpoint point assignment.
    pub fn junction_fields(&self) -> Vec<FieldSpec> {
        let f = self.fields;
        vec![
            FieldSpec::text(&f.from_point_id),
            FieldSpec::text(&f.to_point_id),
            FieldSpec::text(&f.from_point_type),
            FieldSpec::text(&f.to_point_type),
            FieldSpec::integer(&f.connected_point_count),
        ]
    }

    /// Point field receiving rolled-up line values.
    pub fn roll_up_field(&self, name: &str) -> FieldSpec {
        list_field(name)
    }

    /// Derived values of one record. Skipped records clear every field.
    pub fn record_values(&self, record: &SegmentRecord) -> Attributes {
        let f = self.fields;
        let mut values = Attributes::new();
        if record.is_skipped() {
            for spec in self.enrichment_fields() {
                values.insert(spec.name, FieldValue::Null);
            }
            return values;
        }

        values.insert(f.from_adjacent.clone(), joined(&record.from_adjacent_ids));
        values.insert(f.to_adjacent.clone(), joined(&record.to_adjacent_ids));
        values.insert(f.bearing.clone(), record.bearing.into());
        values.insert(
            f.direction.clone(),
            record.direction.map(|d| d.label()).into(),
        );
        values.insert(
            f.material_source.clone(),
            record.material_source.label().into(),
        );
        values.insert(
            f.from_material.clone(),
            record.material(EndKind::Start).into(),
        );
        values.insert(f.to_material.clone(), record.material(EndKind::End).into());
        values.insert(
            f.inferred_code.clone(),
            record.inferred_code().map(|c| c.0).into(),
        );
        values
    }

    pub fn enrichment_updates(&self, records: &[SegmentRecord]) -> Vec<FeatureUpdate> {
        records
            .iter()
            .map(|record| FeatureUpdate {
                id: record.id.0,
                values: self.record_values(record),
            })
            .collect()
    }

    /// One update per line; lines the report does not cover get nulls.
    pub fn junction_updates(&self, lines: &[LineFeature], report: &JunctionReport) -> Vec<FeatureUpdate> {
        let f = self.fields;
        lines
            .iter()
            .map(|line| {
                let ends = report.endpoints.get(&line.id);
                let at = |end: EndKind| ends.and_then(|e| e.at(end));
                let mut values = Attributes::new();
                values.insert(f.from_point_id.clone(), point_id(at(EndKind::Start)));
                values.insert(f.to_point_id.clone(), point_id(at(EndKind::End)));
                values.insert(f.from_point_type.clone(), point_type(at(EndKind::Start)));
                values.insert(f.to_point_type.clone(), point_type(at(EndKind::End)));
                values.insert(
                    f.connected_point_count.clone(),
                    report
                        .connected_counts
                        .get(&line.id)
                        .map(|n| *n as i64)
                        .into(),
                );
                FeatureUpdate {
                    id: line.id.0,
                    values,
                }
            })
            .collect()
    }

    /// Updates writing rolled-up line values into `field` on each point.
    pub fn roll_up_updates(
        &self,
        field: &str,
        values: &BTreeMap<PointId, Option<String>>,
    ) -> Vec<FeatureUpdate> {
        values
            .iter()
            .map(|(id, value)| {
                let mut attrs = Attributes::new();
                attrs.insert(field.to_string(), value.clone().into());
                FeatureUpdate { id: id.0, values: attrs }
            })
            .collect()
    }
}

fn list_field(name: &str) -> FieldSpec {
    FieldSpec {
        length: Some(LIST_FIELD_LENGTH),
        ..FieldSpec::text(name)
    }
}

fn joined(ids: &[String]) -> FieldValue {
    if ids.is_empty() {
        FieldValue::Null
    } else {
        FieldValue::Text(ids.join(", "))
    }
}

fn point_id(m: Option<&PointMatch>) -> FieldValue {
    m.map(|m| m.external_id.clone()).into()
}

fn point_type(m: Option<&PointMatch>) -> FieldValue {
    m.and_then(|m| m.point_type.clone()).into()
}
