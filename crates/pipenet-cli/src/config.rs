//! CLI configuration management.
//!
//! Precedence, lowest first: built-in defaults, the JSON config file, environment
//! variables (a `.env` file is honoured), then command-line flags.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use pipenet_engine::EnrichConfig;
use serde::{Deserialize, Serialize};

/// Application-wide configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the `.pipenet` store.
    pub store: PathBuf,

    /// Line layer used when a command does not name one.
    pub input_layer: Option<String>,

    /// Point layer used when a command does not name one.
    pub point_layer: Option<String>,

    /// Engine settings.
    pub enrich: EnrichConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: PathBuf::from("."),
            input_layer: None,
            point_layer: None,
            enrich: EnrichConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the config file and environment variables.
    pub fn load() -> Result<Self> {
        // Load .env file if present (silently ignore if missing)
        let _ = dotenvy::dotenv();

        let mut config = Self::load_file()?;
        config.apply_env()?;
        Ok(config)
    }

    /// Only what the config file holds, without environment overrides.
    pub fn load_file() -> Result<Self> {
        match Self::config_file_path() {
            Some(path) if path.exists() => {
                let contents = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config from {}", path.display()))?;
                serde_json::from_str(&contents)
                    .with_context(|| format!("Failed to parse config file {}", path.display()))
            }
            _ => Ok(Self::default()),
        }
    }

    /// Environment takes precedence over the file.
    fn apply_env(&mut self) -> Result<()> {
        if let Ok(store) = std::env::var("PIPENET_STORE") {
            self.store = PathBuf::from(store);
        }
        if let Ok(layer) = std::env::var("PIPENET_INPUT_LAYER") {
            self.input_layer = Some(layer);
        }
        if let Ok(layer) = std::env::var("PIPENET_POINT_LAYER") {
            self.point_layer = Some(layer);
        }
        if let Ok(tolerance) = std::env::var("XY_TOLERANCE") {
            self.enrich
                .set("tolerance", &tolerance)
                .with_context(|| "XY_TOLERANCE must be a number")?;
        }
        if let Ok(passes) = std::env::var("PIPENET_MAX_PASSES") {
            self.enrich
                .set("max_passes", &passes)
                .with_context(|| "PIPENET_MAX_PASSES must be a positive integer")?;
        }
        Ok(())
    }

    /// Save current configuration to the config file.
    pub fn save(&self) -> Result<()> {
        if let Some(config_path) = Self::config_file_path() {
            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create config directory: {}", parent.display())
                })?;
            }
            let contents = serde_json::to_string_pretty(self)?;
            std::fs::write(&config_path, contents)
                .with_context(|| format!("Failed to write config to {}", config_path.display()))?;
        }
        Ok(())
    }

    /// Get the path to the config file.
    pub fn config_file_path() -> Option<PathBuf> {
        ProjectDirs::from("dev", "pipenet", "pnet").map(|dirs| dirs.config_dir().join("config.json"))
    }

    /// Replace the engine settings with a JSON run configuration file.
    pub fn load_run_config(&mut self, path: &Path) -> Result<()> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read run config {}", path.display()))?;
        self.enrich = EnrichConfig::from_json(&contents)
            .with_context(|| format!("Invalid run config {}", path.display()))?;
        Ok(())
    }

    /// The input layer, from the flag or the configured default.
    pub fn input_layer(&self, flag: Option<String>) -> Result<String> {
        flag.or_else(|| self.input_layer.clone()).context(
            "No line layer given. Pass one or set PIPENET_INPUT_LAYER / `pnet config set input-layer <name>`",
        )
    }

    /// The point layer, from the flag or the configured default.
    pub fn point_layer(&self, flag: Option<String>) -> Result<String> {
        flag.or_else(|| self.point_layer.clone()).context(
            "No point layer given. Pass one or set PIPENET_POINT_LAYER / `pnet config set point-layer <name>`",
        )
    }
}
