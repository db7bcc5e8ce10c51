//! Config command implementation.
//!
//! Manages CLI configuration.

use std::path::PathBuf;

use anyhow::Result;

use crate::config::Config;

/// Show current configuration.
pub fn show(config: &Config) -> Result<()> {
    let enrich = &config.enrich;

    println!("Pipenet CLI Configuration");
    println!("{:-<40}", "");
    println!("Store:               {}", config.store.display());
    println!(
        "Input Layer:         {}",
        config.input_layer.as_deref().unwrap_or("(not set)")
    );
    println!(
        "Point Layer:         {}",
        config.point_layer.as_deref().unwrap_or("(not set)")
    );
    println!("XY Tolerance:        {}", enrich.tolerance);
    println!("Point Tolerance:     {}", enrich.point_tolerance);
    println!(
        "Max Passes:          {}{}",
        enrich.passes.max_passes,
        if enrich.passes.stop_on_convergence {
            " (stop at fixed point)"
        } else {
            ""
        }
    );
    println!("Type Code Field:     {}", enrich.fields.type_code);
    println!("Output Suffix:       {}", enrich.output.suffix);
    println!("Materials:");
    for entry in enrich.materials.entries() {
        println!("   {:>3}  {}", entry.code, entry.name);
    }

    if let Some(config_path) = Config::config_file_path() {
        println!("\nConfig file: {}", config_path.display());
    }

    Ok(())
}

/// Set a configuration value in the config file.
///
/// Starts from the file alone so environment overrides and flags are not persisted.
pub fn set(key: &str, value: &str) -> Result<()> {
    let mut config = Config::load_file()?;
    match key {
        "store" => config.store = PathBuf::from(value),
        "input-layer" => config.input_layer = Some(value.to_string()),
        "point-layer" => config.point_layer = Some(value.to_string()),
        _ => config.enrich.set(&engine_key(key), value)?,
    }
    config.enrich.validate()?;

    config.save()?;
    println!("Set {} to: {}", key, value);
    Ok(())
}

/// Get a configuration value.
pub fn get(config: &Config, key: &str) -> Result<()> {
    let value = match key {
        "store" => config.store.display().to_string(),
        "input-layer" => config
            .input_layer
            .clone()
            .unwrap_or_else(|| "(not set)".to_string()),
        "point-layer" => config
            .point_layer
            .clone()
            .unwrap_or_else(|| "(not set)".to_string()),
        _ => match config.enrich.get(&engine_key(key)) {
            Some(value) => value,
            None => anyhow::bail!("Unknown config key: {}", key),
        },
    };

    println!("{}", value);
    Ok(())
}

/// Reset configuration to defaults.
pub fn reset() -> Result<()> {
    let config = Config::default();
    config.save()?;
    println!("Configuration reset to defaults");
    Ok(())
}

/// CLI keys are kebab-case; engine keys are snake_case.
fn engine_key(key: &str) -> String {
    key.replace('-', "_")
}
