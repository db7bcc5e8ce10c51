//! Feature layers: a named schema plus its line or point features.

use std::collections::HashMap;
use std::fmt;

use pipenet_core::{Attributes, FieldKind, FieldSpec, FieldValue, LineFeature, PointFeature};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Geometry type of a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    Line,
    Point,
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerKind::Line => write!(f, "line"),
            LayerKind::Point => write!(f, "point"),
        }
    }
}

/// New attribute values for one feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureUpdate {
    pub id: u64,
    pub values: Attributes,
}

/// Summary of a layer without its features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerInfo {
    pub name: String,
    pub kind: LayerKind,
    pub fields: Vec<FieldSpec>,
    pub feature_count: usize,
}

/// A layer with schema and features.
///
/// Only one of `lines` / `points` is populated, according to `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub name: String,
    pub kind: LayerKind,
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lines: Vec<LineFeature>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub points: Vec<PointFeature>,
}

impl Layer {
    /// A line layer. Fields are declared from the attributes present on the features.
    pub fn lines(name: impl Into<String>, lines: Vec<LineFeature>) -> Self {
        let fields = infer_fields(lines.iter().map(|l| &l.attributes));
        Self {
            name: name.into(),
            kind: LayerKind::Line,
            fields,
            lines,
            points: Vec::new(),
        }
    }

    /// A point layer. Fields are declared from the attributes present on the features.
    pub fn points(name: impl Into<String>, points: Vec<PointFeature>) -> Self {
        let fields = infer_fields(points.iter().map(|p| &p.attributes));
        Self {
            name: name.into(),
            kind: LayerKind::Point,
            fields,
            lines: Vec::new(),
            points,
        }
    }

    pub fn feature_count(&self) -> usize {
        match self.kind {
            LayerKind::Line => self.lines.len(),
            LayerKind::Point => self.points.len(),
        }
    }

    pub fn info(&self) -> LayerInfo {
        LayerInfo {
            name: self.name.clone(),
            kind: self.kind,
            fields: self.fields.clone(),
            feature_count: self.feature_count(),
        }
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    /// Declare missing fields; existing ones are left as they are.
    ///
    /// Returns the names that were added.
    pub fn ensure_fields(&mut self, fields: &[FieldSpec]) -> Vec<String> {
        let mut added = Vec::new();
        for spec in fields {
            if !self.has_field(&spec.name) {
                self.fields.push(spec.clone());
                added.push(spec.name.clone());
            }
        }
        added
    }

    fn feature_ids(&self) -> Vec<u64> {
        match self.kind {
            LayerKind::Line => self.lines.iter().map(|l| l.id.0).collect(),
            LayerKind::Point => self.points.iter().map(|p| p.id.0).collect(),
        }
    }

    /// Position of every feature by id. Fails on the first repeated id.
    fn feature_index(&self) -> StoreResult<HashMap<u64, usize>> {
        let ids = self.feature_ids();
        let mut index = HashMap::with_capacity(ids.len());
        for (position, id) in ids.into_iter().enumerate() {
            if index.insert(id, position).is_some() {
                return Err(StoreError::DuplicateFeature {
                    layer: self.name.clone(),
                    id,
                });
            }
        }
        Ok(index)
    }

    /// Feature ids must be unique within a layer.
    pub fn check_unique_ids(&self) -> StoreResult<()> {
        self.feature_index().map(|_| ())
    }

    /// Apply attribute updates. Fails without changing anything if an update names an
    /// undeclared field or an unknown feature.
    pub fn apply_updates(&mut self, updates: &[FeatureUpdate]) -> StoreResult<usize> {
        let index = self.feature_index()?;
        for update in updates {
            if !index.contains_key(&update.id) {
                return Err(StoreError::FeatureNotFound {
                    layer: self.name.clone(),
                    id: update.id,
                });
            }
            if let Some(field) = update.values.keys().find(|f| !self.has_field(f)) {
                return Err(StoreError::FieldNotFound {
                    layer: self.name.clone(),
                    field: field.clone(),
                });
            }
        }

        for update in updates {
            let Some(&position) = index.get(&update.id) else {
                continue;
            };
            let attributes = match self.kind {
                LayerKind::Line => &mut self.lines[position].attributes,
                LayerKind::Point => &mut self.points[position].attributes,
            };
            attributes.extend(update.values.clone());
        }
        Ok(updates.len())
    }

    /// Same content under another name.
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }
}

fn infer_fields<'a>(attributes: impl Iterator<Item = &'a Attributes>) -> Vec<FieldSpec> {
    // Field order follows first appearance; the type comes from the first non-null value.
    let mut fields: Vec<(String, Option<FieldKind>)> = Vec::new();
    for attrs in attributes {
        for (name, value) in attrs {
            let kind = match value {
                FieldValue::Null => None,
                FieldValue::Integer(_) => Some(FieldKind::Integer),
                FieldValue::Double(_) => Some(FieldKind::Double),
                FieldValue::Text(_) => Some(FieldKind::Text),
            };
            match fields.iter_mut().find(|(n, _)| n == name) {
                Some((_, slot)) => {
                    if slot.is_none() {
                        *slot = kind;
                    }
                }
                None => fields.push((name.clone(), kind)),
            }
        }
    }

    fields
        .into_iter()
        .map(|(name, kind)| match kind.unwrap_or(FieldKind::Text) {
            FieldKind::Integer => FieldSpec::integer(name),
            FieldKind::Double => FieldSpec::double(name),
            FieldKind::Text => FieldSpec::text(name),
        })
        .collect()
}
