//! Import, export and status of the layer store.

use std::path::Path;

use anyhow::{Context, Result};
use humansize::{format_size, DECIMAL};
use pipenet_store::{FeatureStore, JsonFileStore, LayerKind, PipenetOps};

use crate::config::Config;

/// Copy a layer file into the store.
pub fn import(config: &Config, file: &Path, name: Option<&str>, overwrite: bool) -> Result<()> {
    let mut store = JsonFileStore::new(&config.store);
    let layer = store
        .import_file(file, name, overwrite)
        .with_context(|| format!("Failed to import {}", file.display()))?;

    println!(
        "✅ Imported {} ({} layer, {} features)",
        layer.name,
        layer.kind,
        layer.feature_count()
    );
    Ok(())
}

/// Write a stored layer to a file.
pub fn export(config: &Config, layer: &str, file: &Path) -> Result<()> {
    let store = JsonFileStore::open(&config.store)?;
    store
        .export_file(layer, file)
        .with_context(|| format!("Failed to export {}", layer))?;
    println!("✅ Exported {} to {}", layer, file.display());
    Ok(())
}

/// Print store location, size and layers.
pub fn status(config: &Config) -> Result<()> {
    let store = JsonFileStore::new(&config.store);

    println!("📊 Pipenet Status");
    println!("{:─<50}", "");
    println!();
    println!("📍 Store:      {}", store.store_dir().display());

    let stats = store.stats()?;
    if !stats.exists {
        println!();
        println!("No store yet. Run `pnet import <file>` to add a layer.");
        return Ok(());
    }

    println!("💾 Size:       {}", format_size(stats.total_size, DECIMAL));
    println!("🗂  Runs:       {}", stats.run_count);

    let ops = PipenetOps::new(store, config.enrich.clone());
    let layers = ops.layers()?;
    println!();
    println!("📦 Layers ({}):", layers.len());
    for info in &layers {
        let kind = match info.kind {
            LayerKind::Line => "lines ",
            LayerKind::Point => "points",
        };
        println!(
            "   • {:<30} {} {:>7} features, {} fields",
            info.name,
            kind,
            info.feature_count,
            info.fields.len()
        );
    }

    if let Some(latest) = ops.store().list_runs()?.first() {
        let report = ops.store().load_run(latest)?;
        println!();
        println!(
            "🕑 Last run:   {:?} {} → {} ({} features)",
            report.kind, report.input_layer, report.output_layer, report.updated
        );
    }

    Ok(())
}

/// Names of the stored layers, one per line.
pub fn list(config: &Config) -> Result<()> {
    let store = JsonFileStore::open(&config.store)?;
    for name in store.layer_names()? {
        println!("{}", name);
    }
    Ok(())
}
