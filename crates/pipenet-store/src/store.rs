//! The feature-store boundary and an in-memory implementation.

use std::collections::BTreeMap;
use std::path::PathBuf;

use pipenet_core::{FieldSpec, LineFeature, PointFeature};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::layer::{FeatureUpdate, Layer, LayerInfo, LayerKind};
use crate::report::RunReport;

/// Read/write access to named feature layers.
///
/// Implementations provide whole-layer load and save; the bulk operations used by
/// the runs are built on top of those.
pub trait FeatureStore {
    fn layer_names(&self) -> StoreResult<Vec<String>>;

    fn has_layer(&self, name: &str) -> StoreResult<bool>;

    fn load_layer(&self, name: &str) -> StoreResult<Layer>;

    /// Create or replace a layer.
    fn save_layer(&mut self, layer: &Layer) -> StoreResult<()>;

    /// Persist a run report. Stores without a place for reports ignore it.
    fn save_run_report(&mut self, report: &RunReport) -> StoreResult<Option<PathBuf>> {
        let _ = report;
        Ok(None)
    }

    fn layer_info(&self, name: &str) -> StoreResult<LayerInfo> {
        Ok(self.load_layer(name)?.info())
    }

    fn read_lines(&self, name: &str) -> StoreResult<Vec<LineFeature>> {
        let layer = self.load_layer(name)?;
        expect_kind(&layer, LayerKind::Line)?;
        Ok(layer.lines)
    }

    fn read_points(&self, name: &str) -> StoreResult<Vec<PointFeature>> {
        let layer = self.load_layer(name)?;
        expect_kind(&layer, LayerKind::Point)?;
        Ok(layer.points)
    }

    /// Copy `from` to `to`. An existing `to` is replaced only when `overwrite` is set.
    fn copy_layer(&mut self, from: &str, to: &str, overwrite: bool) -> StoreResult<()> {
        if !overwrite && self.has_layer(to)? {
            return Err(StoreError::LayerExists {
                layer: to.to_string(),
            });
        }
        let copy = self.load_layer(from)?.renamed(to);
        self.save_layer(&copy)?;
        debug!(from, to, "layer_copied");
        Ok(())
    }

    /// Add any of `fields` the layer does not declare yet. Returns the added names.
    fn ensure_fields(&mut self, name: &str, fields: &[FieldSpec]) -> StoreResult<Vec<String>> {
        let mut layer = self.load_layer(name)?;
        let added = layer.ensure_fields(fields);
        if !added.is_empty() {
            self.save_layer(&layer)?;
            debug!(layer = name, added = ?added, "fields_added");
        }
        Ok(added)
    }

    /// Write attribute values in one batch. Nothing is written if any update is invalid.
    fn update_attributes(&mut self, name: &str, updates: &[FeatureUpdate]) -> StoreResult<usize> {
        let mut layer = self.load_layer(name)?;
        let count = layer.apply_updates(updates)?;
        self.save_layer(&layer)?;
        Ok(count)
    }
}

fn expect_kind(layer: &Layer, kind: LayerKind) -> StoreResult<()> {
    if layer.kind == kind {
        Ok(())
    } else {
        Err(StoreError::WrongGeometry {
            layer: layer.name.clone(),
            expected: kind.to_string(),
        })
    }
}

/// Layers held in memory; the default store for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    layers: BTreeMap<String, Layer>,
    reports: Vec<RunReport>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a layer (builder pattern).
    pub fn with_layer(mut self, layer: Layer) -> Self {
        self.layers.insert(layer.name.clone(), layer);
        self
    }

    pub fn layer(&self, name: &str) -> Option<&Layer> {
        self.layers.get(name)
    }

    /// Reports saved so far, oldest first.
    pub fn reports(&self) -> &[RunReport] {
        &self.reports
    }
}

impl FeatureStore for MemoryStore {
    fn layer_names(&self) -> StoreResult<Vec<String>> {
        Ok(self.layers.keys().cloned().collect())
    }

    fn has_layer(&self, name: &str) -> StoreResult<bool> {
        Ok(self.layers.contains_key(name))
    }

    fn load_layer(&self, name: &str) -> StoreResult<Layer> {
        self.layers
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::layer_not_found(name))
    }

    fn save_layer(&mut self, layer: &Layer) -> StoreResult<()> {
        layer.check_unique_ids()?;
        self.layers.insert(layer.name.clone(), layer.clone());
        Ok(())
    }

    fn save_run_report(&mut self, report: &RunReport) -> StoreResult<Option<PathBuf>> {
        self.reports.push(report.clone());
        Ok(None)
    }
}
