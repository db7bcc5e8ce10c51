//! PipenetOps - store-backed runs of the engine.
//!
//! Every run reads whole layers, computes everything in memory, and only then
//! writes. A configuration or input problem therefore leaves the store untouched.

use pipenet_core::{CoordinateTransform, IdentityTransform};
use pipenet_engine::{roll_up_line_values, EnrichConfig, Enricher};
use tracing::{info, warn};

use crate::error::{StoreError, StoreResult};
use crate::layer::LayerInfo;
use crate::report::{RunKind, RunReport};
use crate::requests::*;
use crate::responses::*;
use crate::store::FeatureStore;
use crate::writer::Writer;

/// Runs enrichment, point assignment and roll-ups against a [`FeatureStore`].
pub struct PipenetOps<S: FeatureStore> {
    store: S,
    config: EnrichConfig,
    transform: Box<dyn CoordinateTransform>,
}

impl<S: FeatureStore> PipenetOps<S> {
    pub fn new(store: S, config: EnrichConfig) -> Self {
        Self {
            store,
            config,
            transform: Box::new(IdentityTransform),
        }
    }

    /// Reproject input coordinates into the working frame before matching.
    pub fn with_transform(mut self, transform: impl CoordinateTransform + 'static) -> Self {
        self.transform = Box::new(transform);
        self
    }

    pub fn config(&self) -> &EnrichConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    // =========================================================================
    // Enrichment
    // =========================================================================

    /// Derive adjacency, direction and materials and write them to the output layer.
    pub fn enrich(&mut self, request: &EnrichRequest) -> StoreResult<EnrichResponse> {
        let input = request.input_layer.as_str();
        let features = self.store.read_lines(input)?;

        let enrichment = Enricher::new(&self.config)?
            .with_transform(self.transform.as_ref())
            .enrich(&features)?;

        let output = if request.in_place {
            input.to_string()
        } else {
            let output = request
                .output_layer
                .clone()
                .unwrap_or_else(|| self.config.output.output_name(input));
            self.store.copy_layer(input, &output, request.overwrite)?;
            output
        };

        let writer = Writer::new(&self.config.fields);
        let added_fields = self
            .store
            .ensure_fields(&output, &writer.enrichment_fields())?;
        let updated = self
            .store
            .update_attributes(&output, &writer.enrichment_updates(&enrichment.records))?;

        let summary = enrichment.summary();
        let issues = enrichment.issues();
        if !issues.is_empty() {
            warn!(layer = %output, issues = issues.len(), "segments_flagged");
        }

        let mut report = RunReport::new(RunKind::Enrich, input, &output);
        report.updated = updated;
        report.added_fields = added_fields.clone();
        report.summary = Some(summary.clone());
        report.issues = issues.clone();
        let report_path = self.store.save_run_report(&report)?;

        info!(
            input,
            output = %output,
            updated,
            passes = summary.passes,
            converged = summary.converged,
            "enrich_written"
        );

        Ok(EnrichResponse {
            input_layer: input.to_string(),
            output_layer: output,
            summary,
            issues,
            added_fields,
            updated,
            report_path,
        })
    }

    // =========================================================================
    // Junction points
    // =========================================================================

    /// Write the nearest point at each segment end and the count of points along it.
    pub fn assign_points(&mut self, request: &PointsRequest) -> StoreResult<PointsResponse> {
        let lines = self.store.read_lines(&request.line_layer)?;
        let points = self.store.read_points(&request.point_layer)?;

        let junctions = Enricher::new(&self.config)?
            .with_transform(self.transform.as_ref())
            .junction_points(&lines, &points)?;
        let assigned_endpoints: usize = junctions
            .endpoints
            .values()
            .map(|e| e.from.is_some() as usize + e.to.is_some() as usize)
            .sum();

        let writer = Writer::new(&self.config.fields);
        let added_fields = self
            .store
            .ensure_fields(&request.line_layer, &writer.junction_fields())?;
        let updated = self.store.update_attributes(
            &request.line_layer,
            &writer.junction_updates(&lines, &junctions),
        )?;

        let mut report = RunReport::new(RunKind::AssignPoints, &request.point_layer, &request.line_layer);
        report.updated = updated;
        report.added_fields = added_fields.clone();
        let report_path = self.store.save_run_report(&report)?;

        info!(
            lines = %request.line_layer,
            points = %request.point_layer,
            assigned_endpoints,
            "points_assigned"
        );

        Ok(PointsResponse {
            line_layer: request.line_layer.clone(),
            point_layer: request.point_layer.clone(),
            assigned_endpoints,
            added_fields,
            updated,
            report_path,
        })
    }

    // =========================================================================
    // Roll-up
    // =========================================================================

    /// Collect a line attribute onto the points where the lines end.
    ///
    /// Both layers are compared in their stored coordinates.
    pub fn roll_up(&mut self, request: &RollUpRequest) -> StoreResult<RollUpResponse> {
        self.config.validate()?;
        let line_info = self.store.layer_info(&request.line_layer)?;
        if !line_info.fields.iter().any(|f| f.name == request.line_field) {
            return Err(StoreError::FieldNotFound {
                layer: request.line_layer.clone(),
                field: request.line_field.clone(),
            });
        }
        let lines = self.store.read_lines(&request.line_layer)?;
        let points = self.store.read_points(&request.point_layer)?;

        let values = roll_up_line_values(
            &points,
            &lines,
            &request.line_field,
            self.config.point_tolerance,
        );
        let with_values = values.values().filter(|v| v.is_some()).count();

        let writer = Writer::new(&self.config.fields);
        let added_fields = self.store.ensure_fields(
            &request.point_layer,
            &[writer.roll_up_field(&request.point_field)],
        )?;
        let updated = self.store.update_attributes(
            &request.point_layer,
            &writer.roll_up_updates(&request.point_field, &values),
        )?;

        let mut report = RunReport::new(RunKind::RollUp, &request.line_layer, &request.point_layer);
        report.updated = updated;
        report.added_fields = added_fields.clone();
        let report_path = self.store.save_run_report(&report)?;

        info!(
            points = %request.point_layer,
            field = %request.point_field,
            with_values,
            "line_values_rolled_up"
        );

        Ok(RollUpResponse {
            point_layer: request.point_layer.clone(),
            point_field: request.point_field.clone(),
            with_values,
            added_fields,
            updated,
            report_path,
        })
    }

    // =========================================================================
    // Status
    // =========================================================================

    /// Every layer in the store, without features.
    pub fn layers(&self) -> StoreResult<Vec<LayerInfo>> {
        self.store
            .layer_names()?
            .iter()
            .map(|name| self.store.layer_info(name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::Layer;
    use crate::store::MemoryStore;
    use pipenet_core::{FieldValue, OffsetTransform};
    use pipenet_engine::test_fixtures::NetworkBuilder;

    fn ops() -> PipenetOps<MemoryStore> {
        let mut builder = NetworkBuilder::new();
        builder.add_chain((0.0, 0.0), (0.0, 10.0), 3, Some(1));
        let (lines, _) = builder.build();
        PipenetOps::new(
            MemoryStore::new().with_layer(Layer::lines("sewer", lines)),
            EnrichConfig::default(),
        )
    }

    #[test]
    fn test_enrich_writes_copy_and_report() {
        let mut ops = ops();
        let response = ops.enrich(&EnrichRequest::new("sewer")).unwrap();

        assert_eq!(response.output_layer, "sewer_enriched");
        assert_eq!(response.updated, 3);
        assert!(response.added_fields.contains(&"From_Material".to_string()));

        let store = ops.store();
        let input = store.layer("sewer").unwrap();
        assert!(!input.has_field("From_Material"));

        let output = store.layer("sewer_enriched").unwrap();
        assert_eq!(
            output.lines[2].attribute("From_Material"),
            Some(&FieldValue::from("PVC"))
        );
        assert_eq!(store.reports().len(), 1);
        assert_eq!(store.reports()[0].kind, RunKind::Enrich);
    }

    #[test]
    fn test_enrich_in_place() {
        let mut ops = ops();
        let response = ops.enrich(&EnrichRequest::new("sewer").in_place()).unwrap();
        assert_eq!(response.output_layer, "sewer");
        assert_eq!(ops.store().layer_names().unwrap(), vec!["sewer"]);
        assert!(ops.store().layer("sewer").unwrap().has_field("direction_text"));
    }

    #[test]
    fn test_failed_config_leaves_store_untouched() {
        let mut ops = ops();
        ops.config.tolerance = -1.0;
        assert!(matches!(
            ops.enrich(&EnrichRequest::new("sewer")),
            Err(StoreError::Network(_))
        ));
        assert_eq!(ops.store().layer_names().unwrap(), vec!["sewer"]);
        assert!(ops.store().reports().is_empty());
    }

    #[test]
    fn test_transform_applies_to_every_feature() {
        let mut ops = ops().with_transform(OffsetTransform { dx: 100.0, dy: 0.0 });
        let response = ops.enrich(&EnrichRequest::new("sewer")).unwrap();
        assert_eq!(response.summary.connections, 2);
    }
}
