//! End-to-end runs against the on-disk JSON store.

use pipenet_core::{FieldValue, SegmentId};
use pipenet_engine::test_fixtures::NetworkBuilder;
use pipenet_engine::{EnrichConfig, NetworkError, PassLimit};
use pipenet_store::{
    EnrichRequest, FeatureStore, JsonFileStore, Layer, MemoryStore, PipenetOps, PointsRequest,
    RollUpRequest, RunKind, StoreError,
};
use tempfile::TempDir;

/// Sewer main with a lateral: 1 -> 2 -> 3 running north, 4 branching east off the 1/2 junction.
fn seeded_store(dir: &TempDir) -> anyhow::Result<JsonFileStore> {
    let mut builder = NetworkBuilder::new();
    builder.add_chain((0.0, 0.0), (0.0, 10.0), 3, Some(2));
    builder.add_line((0.0, 10.0), (10.0, 10.0), None);
    builder.add_point((0.0, 0.0), "Cleanout");
    builder.add_point((0.0, 10.0), "Manhole");
    builder.add_point((0.0, 30.0), "Manhole");
    let (lines, points) = builder.build();

    let mut store = JsonFileStore::new(dir.path());
    store.init()?;
    store.save_layer(&Layer::lines("sewer", lines))?;
    store.save_layer(&Layer::points("manholes", points))?;
    Ok(store)
}

#[test]
fn enrich_persists_output_and_report() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let store = seeded_store(&dir)?;
    let mut ops = PipenetOps::new(store, EnrichConfig::default());

    let response = ops.enrich(&EnrichRequest::new("sewer"))?;
    assert_eq!(response.output_layer, "sewer_enriched");
    assert!(response.summary.converged);
    assert_eq!(response.summary.components, 1);
    let report_path = response.report_path.clone().expect("json store keeps reports");

    // A fresh handle sees the same state.
    let store = JsonFileStore::open(dir.path())?;
    assert_eq!(store.layer_names()?, vec!["manholes", "sewer", "sewer_enriched"]);

    let output = store.read_lines("sewer_enriched")?;
    let first = output.iter().find(|l| l.id == SegmentId(1)).unwrap();
    assert_eq!(first.attribute("to_adjacent_id"), Some(&FieldValue::from("L2, L4")));
    assert_eq!(first.attribute("direction_text"), Some(&FieldValue::from("N")));
    assert_eq!(first.attribute("Material_Source"), Some(&FieldValue::from("Legacy")));

    let lateral = output.iter().find(|l| l.id == SegmentId(4)).unwrap();
    assert_eq!(lateral.attribute("From_Material"), Some(&FieldValue::from("RCP")));
    assert_eq!(lateral.attribute("To_Material"), Some(&FieldValue::Null));
    assert_eq!(lateral.attribute("direction_text"), Some(&FieldValue::from("E")));

    let report = store.load_run(&report_path)?;
    assert_eq!(report.kind, RunKind::Enrich);
    assert_eq!(report.updated, 4);
    assert!(report.summary.is_some());
    Ok(())
}

#[test]
fn second_enrich_needs_overwrite() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let mut ops = PipenetOps::new(seeded_store(&dir)?, EnrichConfig::default());

    ops.enrich(&EnrichRequest::new("sewer"))?;
    assert!(matches!(
        ops.enrich(&EnrichRequest::new("sewer")),
        Err(StoreError::LayerExists { .. })
    ));

    let again = ops.enrich(&EnrichRequest::new("sewer").overwrite())?;
    assert_eq!(again.updated, 4);

    // Writing in place twice only declares the fields once.
    let first = ops.enrich(&EnrichRequest::new("sewer").in_place())?;
    let second = ops.enrich(&EnrichRequest::new("sewer").in_place())?;
    assert_eq!(first.added_fields.len(), 8);
    assert!(second.added_fields.is_empty());
    assert_eq!(first.summary.known_codes, second.summary.known_codes);
    Ok(())
}

#[test]
fn points_and_roll_up() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let mut ops = PipenetOps::new(seeded_store(&dir)?, EnrichConfig::default());

    let points = ops.assign_points(&PointsRequest::new("sewer", "manholes"))?;
    // 1: both ends, 2: start, 3: end, 4: start.
    assert_eq!(points.assigned_endpoints, 5);

    let lines = ops.store().read_lines("sewer")?;
    let second = lines.iter().find(|l| l.id == SegmentId(2)).unwrap();
    assert_eq!(second.attribute("from_point_id"), Some(&FieldValue::from("P2")));
    assert_eq!(second.attribute("from_point_type"), Some(&FieldValue::from("Manhole")));
    assert_eq!(second.attribute("to_point_id"), Some(&FieldValue::Null));
    assert_eq!(second.attribute("connected_point_count"), Some(&FieldValue::Integer(1)));

    let rolled = ops.roll_up(&RollUpRequest::new("manholes", "sewer", "FACILITYID", "line_ids"))?;
    assert_eq!(rolled.with_values, 3);
    let manholes = ops.store().read_points("manholes")?;
    assert_eq!(
        manholes[1].attribute("line_ids"),
        Some(&FieldValue::from("L1, L2, L4"))
    );

    assert!(matches!(
        ops.roll_up(&RollUpRequest::new("manholes", "sewer", "NOPE", "x")),
        Err(StoreError::FieldNotFound { .. })
    ));
    assert_eq!(ops.store().list_runs()?.len(), 2);
    Ok(())
}

#[test]
fn rerun_on_output_continues_propagation() -> anyhow::Result<()> {
    let mut builder = NetworkBuilder::new();
    builder.add_chain((0.0, 0.0), (0.0, 10.0), 4, Some(1));
    let (lines, _) = builder.build();
    let store = MemoryStore::new().with_layer(Layer::lines("sewer", lines));
    let config = EnrichConfig {
        passes: PassLimit::until_converged(1),
        ..Default::default()
    };
    let mut ops = PipenetOps::new(store, config);

    let first = ops.enrich(&EnrichRequest::new("sewer"))?;
    assert!(!first.summary.converged);
    assert_eq!(first.summary.known_codes, 2);

    let output = ops.store().read_lines("sewer_enriched")?;
    let second = output.iter().find(|l| l.id == SegmentId(2)).unwrap();
    assert_eq!(second.attribute("Inferred_Code"), Some(&FieldValue::Integer(1)));
    assert_eq!(second.attribute("PIPE_TYPE"), Some(&FieldValue::Null));

    // The inferred code seeds the next run, so it reaches one segment further.
    let rerun = ops.enrich(&EnrichRequest::new("sewer_enriched").with_output("sewer_pass2"))?;
    assert_eq!(rerun.summary.known_codes, 3);

    let output = ops.store().read_lines("sewer_pass2")?;
    let second = output.iter().find(|l| l.id == SegmentId(2)).unwrap();
    let third = output.iter().find(|l| l.id == SegmentId(3)).unwrap();
    assert_eq!(second.attribute("Material_Source"), Some(&FieldValue::from("Adjacency")));
    assert_eq!(third.attribute("From_Material"), Some(&FieldValue::from("PVC")));
    assert_eq!(third.attribute("Inferred_Code"), Some(&FieldValue::Integer(1)));
    Ok(())
}

#[test]
fn duplicate_feature_ids_abort_the_run() -> anyhow::Result<()> {
    let mut builder = NetworkBuilder::new();
    builder.add_chain((0.0, 0.0), (0.0, 10.0), 2, Some(1));
    let (mut lines, _) = builder.build();
    lines[1].id = SegmentId(1);
    let store = MemoryStore::new().with_layer(Layer::lines("sewer", lines));
    let mut ops = PipenetOps::new(store, EnrichConfig::default());

    assert!(matches!(
        ops.enrich(&EnrichRequest::new("sewer")),
        Err(StoreError::Network(NetworkError::DuplicateSegment {
            segment: SegmentId(1)
        }))
    ));
    assert_eq!(ops.store().layer_names()?, vec!["sewer"]);
    Ok(())
}
