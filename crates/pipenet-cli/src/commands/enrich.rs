//! Enrichment, point assignment and roll-up commands.

use anyhow::{Context, Result};
use pipenet_store::{
    EnrichRequest, EnrichResponse, JsonFileStore, PipenetOps, PointsRequest, RollUpRequest,
};
use serde::Serialize;

use crate::config::Config;

fn open(config: &Config) -> Result<PipenetOps<JsonFileStore>> {
    let store = JsonFileStore::open(&config.store)?;
    Ok(PipenetOps::new(store, config.enrich.clone()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Enrich a line layer and print a run summary.
pub fn execute(config: &Config, request: EnrichRequest, json: bool) -> Result<()> {
    let mut ops = open(config)?;
    let response = ops
        .enrich(&request)
        .with_context(|| format!("Failed to enrich {}", request.input_layer))?;

    if json {
        return print_json(&response);
    }
    print_summary(&response);
    Ok(())
}

fn print_summary(response: &EnrichResponse) {
    let s = &response.summary;

    println!("✅ Enriched {} → {}", response.input_layer, response.output_layer);
    println!();
    println!("   Features:     {}", s.features);
    println!("   Segments:     {} ({} degenerate, {} skipped)", s.segments, s.degenerate, s.skipped);
    println!("   Junctions:    {} ({} connections)", s.junctions, s.connections);
    println!("   Networks:     {}", s.components);
    println!(
        "   Passes:       {}{}",
        s.passes,
        if s.converged { "" } else { " (limit reached before fixed point)" }
    );
    println!("   Known codes:  {}", s.known_codes);
    if s.ambiguous_endpoints > 0 {
        println!("   ⚠️  Ambiguous: {} endpoints left unresolved", s.ambiguous_endpoints);
    }
    if !s.unmapped_codes.is_empty() {
        let codes: Vec<String> = s.unmapped_codes.iter().map(|c| c.to_string()).collect();
        println!("   ⚠️  Unmapped codes treated as unknown: {}", codes.join(", "));
    }
    if !response.added_fields.is_empty() {
        println!("   Added fields: {}", response.added_fields.join(", "));
    }
    if let Some(path) = &response.report_path {
        println!();
        println!("📄 Report: {}", path.display());
    }
}

/// Assign point ids and types to segment ends.
pub fn points(config: &Config, request: PointsRequest, json: bool) -> Result<()> {
    let mut ops = open(config)?;
    let response = ops.assign_points(&request).with_context(|| {
        format!(
            "Failed to assign {} to {}",
            request.point_layer, request.line_layer
        )
    })?;

    if json {
        return print_json(&response);
    }
    println!(
        "✅ Assigned {} endpoints of {} from {}",
        response.assigned_endpoints, response.line_layer, response.point_layer
    );
    Ok(())
}

/// Roll a line attribute up onto points.
pub fn roll_up(config: &Config, request: RollUpRequest, json: bool) -> Result<()> {
    let mut ops = open(config)?;
    let response = ops.roll_up(&request).with_context(|| {
        format!(
            "Failed to roll {}.{} onto {}",
            request.line_layer, request.line_field, request.point_layer
        )
    })?;

    if json {
        return print_json(&response);
    }
    println!(
        "✅ Wrote {} on {} of {} points",
        response.point_field, response.with_values, response.updated
    );
    Ok(())
}
