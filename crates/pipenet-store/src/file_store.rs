//! Layer persistence in a `.pipenet` folder.
//!
//! ## File Structure
//!
//! ```text
//! .pipenet/
//! ├── layers/
//! │   ├── sewer_lines.json           # one Layer per file
//! │   └── sewer_lines_enriched.json
//! └── runs/
//!     └── 1703800000-enrich-sewer_lines_enriched.json
//! ```

use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{StoreError, StoreResult};
use crate::layer::Layer;
use crate::report::{RunKind, RunReport};
use crate::store::FeatureStore;

/// Name of the persistence folder.
pub const PIPENET_DIR: &str = ".pipenet";

const LAYERS_DIR: &str = "layers";
const RUNS_DIR: &str = "runs";

/// Storage statistics.
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub exists: bool,
    pub layer_count: usize,
    pub run_count: usize,
    pub total_size: u64,
}

/// Feature store backed by one JSON file per layer.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
    store_dir: PathBuf,
}

impl JsonFileStore {
    /// Store for the workspace at `root`; nothing is created until the first write.
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let store_dir = root.join(PIPENET_DIR);
        Self { root, store_dir }
    }

    /// Open an existing store, failing if `root` has none.
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let store = Self::new(root);
        if !store.exists() {
            return Err(StoreError::StoreNotFound {
                path: store.store_dir.clone(),
            });
        }
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    pub fn exists(&self) -> bool {
        self.store_dir.exists()
    }

    /// Create the directory structure.
    pub fn init(&self) -> StoreResult<()> {
        for dir in [LAYERS_DIR, RUNS_DIR] {
            let path = self.store_dir.join(dir);
            if !path.exists() {
                std::fs::create_dir_all(&path)?;
                debug!(path = %path.display(), "created_store_dir");
            }
        }
        Ok(())
    }

    fn layer_path(&self, name: &str) -> StoreResult<PathBuf> {
        validate_layer_name(name)?;
        Ok(self.store_dir.join(LAYERS_DIR).join(format!("{name}.json")))
    }

    /// Read a layer file from anywhere and add it to the store.
    ///
    /// `name` overrides the name recorded in the file.
    pub fn import_file(&mut self, path: &Path, name: Option<&str>, overwrite: bool) -> StoreResult<Layer> {
        let json = std::fs::read_to_string(path)?;
        let mut layer: Layer = serde_json::from_str(&json)?;
        if let Some(name) = name {
            layer.name = name.to_string();
        }
        layer.check_unique_ids()?;
        if !overwrite && self.has_layer(&layer.name)? {
            return Err(StoreError::LayerExists { layer: layer.name });
        }
        self.save_layer(&layer)?;
        info!(
            path = %path.display(),
            layer = %layer.name,
            features = layer.feature_count(),
            "layer_imported"
        );
        Ok(layer)
    }

    /// Write a layer to an arbitrary file.
    pub fn export_file(&self, name: &str, path: &Path) -> StoreResult<()> {
        let layer = self.load_layer(name)?;
        std::fs::write(path, serde_json::to_string_pretty(&layer)?)?;
        info!(layer = name, path = %path.display(), "layer_exported");
        Ok(())
    }

    /// Saved run reports, newest first.
    pub fn list_runs(&self) -> StoreResult<Vec<PathBuf>> {
        let runs_dir = self.store_dir.join(RUNS_DIR);
        if !runs_dir.exists() {
            return Ok(vec![]);
        }

        let mut runs: Vec<PathBuf> = std::fs::read_dir(&runs_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|e| e == "json").unwrap_or(false))
            .collect();
        runs.sort_by(|a, b| b.cmp(a));
        Ok(runs)
    }

    pub fn load_run(&self, path: &Path) -> StoreResult<RunReport> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Remove the `.pipenet` directory.
    pub fn clean(&self) -> StoreResult<()> {
        if self.store_dir.exists() {
            std::fs::remove_dir_all(&self.store_dir)?;
            info!(path = %self.store_dir.display(), "store_removed");
        }
        Ok(())
    }

    pub fn stats(&self) -> StoreResult<StoreStats> {
        if !self.exists() {
            return Ok(StoreStats::default());
        }

        let total_size = WalkDir::new(&self.store_dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
            .filter_map(|e| e.metadata().ok())
            .map(|m| m.len())
            .sum();

        Ok(StoreStats {
            exists: true,
            layer_count: self.layer_names()?.len(),
            run_count: self.list_runs()?.len(),
            total_size,
        })
    }
}

impl FeatureStore for JsonFileStore {
    fn layer_names(&self) -> StoreResult<Vec<String>> {
        let layers_dir = self.store_dir.join(LAYERS_DIR);
        if !layers_dir.exists() {
            return Ok(vec![]);
        }

        let mut names: Vec<String> = std::fs::read_dir(&layers_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|e| e == "json").unwrap_or(false))
            .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().to_string()))
            .collect();
        names.sort();
        Ok(names)
    }

    fn has_layer(&self, name: &str) -> StoreResult<bool> {
        Ok(self.layer_path(name)?.exists())
    }

    fn load_layer(&self, name: &str) -> StoreResult<Layer> {
        let path = self.layer_path(name)?;
        if !path.exists() {
            return Err(StoreError::layer_not_found(name));
        }
        let json = std::fs::read_to_string(&path)?;
        let layer: Layer = serde_json::from_str(&json)?;
        layer.check_unique_ids()?;
        debug!(layer = name, features = layer.feature_count(), "layer_loaded");
        Ok(layer)
    }

    fn save_layer(&mut self, layer: &Layer) -> StoreResult<()> {
        let path = self.layer_path(&layer.name)?;
        self.init()?;
        std::fs::write(&path, serde_json::to_string_pretty(layer)?)?;
        debug!(
            layer = %layer.name,
            features = layer.feature_count(),
            path = %path.display(),
            "layer_saved"
        );
        Ok(())
    }

    fn save_run_report(&mut self, report: &RunReport) -> StoreResult<Option<PathBuf>> {
        self.init()?;
        let kind = match report.kind {
            RunKind::Enrich => "enrich",
            RunKind::AssignPoints => "points",
            RunKind::RollUp => "rollup",
        };
        let runs_dir = self.store_dir.join(RUNS_DIR);
        let stem = format!("{}-{}-{}", report.timestamp(), kind, report.output_layer);
        let mut path = runs_dir.join(format!("{stem}.json"));
        let mut n = 1;
        while path.exists() {
            path = runs_dir.join(format!("{stem}-{n}.json"));
            n += 1;
        }

        std::fs::write(&path, serde_json::to_string_pretty(report)?)?;
        info!(path = %path.display(), "run_report_saved");
        Ok(Some(path))
    }
}

fn validate_layer_name(name: &str) -> StoreResult<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidLayerName {
            layer: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipenet_core::{LineFeature, Point, SegmentId};
    use tempfile::TempDir;

    fn sample_layer(name: &str) -> Layer {
        Layer::lines(
            name,
            vec![LineFeature::new(
                SegmentId(1),
                Point::new(0.0, 0.0),
                Point::new(0.0, 5.0),
            )
            .with_attribute("PIPE_TYPE", 3i64)],
        )
    }

    #[test]
    fn test_save_and_load_layer() {
        let temp = TempDir::new().unwrap();
        let mut store = JsonFileStore::new(temp.path());
        assert!(!store.exists());

        store.save_layer(&sample_layer("sewer")).unwrap();
        assert!(store.exists());
        assert_eq!(store.layer_names().unwrap(), vec!["sewer"]);

        let loaded = store.load_layer("sewer").unwrap();
        assert_eq!(loaded, sample_layer("sewer"));
    }

    #[test]
    fn test_open_requires_existing_store() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            JsonFileStore::open(temp.path()),
            Err(StoreError::StoreNotFound { .. })
        ));
    }

    #[test]
    fn test_layer_names_are_validated() {
        let temp = TempDir::new().unwrap();
        let store = JsonFileStore::new(temp.path());
        for bad in ["", "../escape", "a/b", ".hidden"] {
            assert!(matches!(
                store.load_layer(bad),
                Err(StoreError::InvalidLayerName { .. })
            ));
        }
        assert!(matches!(
            store.load_layer("sewer_2277"),
            Err(StoreError::LayerNotFound { .. })
        ));
    }

    #[test]
    fn test_run_reports_do_not_collide() {
        let temp = TempDir::new().unwrap();
        let mut store = JsonFileStore::new(temp.path());
        let report = RunReport::new(RunKind::Enrich, "sewer", "sewer_enriched");

        let first = store.save_run_report(&report).unwrap().unwrap();
        let second = store.save_run_report(&report).unwrap().unwrap();
        assert_ne!(first, second);
        assert_eq!(store.list_runs().unwrap().len(), 2);
        assert_eq!(store.load_run(&first).unwrap().output_layer, "sewer_enriched");

        let stats = store.stats().unwrap();
        assert_eq!(stats.run_count, 2);
        assert!(stats.total_size > 0);
    }

    #[test]
    fn test_import_and_export() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("input.json");
        std::fs::write(&file, serde_json::to_string(&sample_layer("raw")).unwrap()).unwrap();

        let mut store = JsonFileStore::new(temp.path());
        let layer = store.import_file(&file, Some("sewer"), false).unwrap();
        assert_eq!(layer.name, "sewer");
        assert!(matches!(
            store.import_file(&file, Some("sewer"), false),
            Err(StoreError::LayerExists { .. })
        ));

        let out = temp.path().join("out.json");
        store.export_file("sewer", &out).unwrap();
        let exported: Layer = serde_json::from_str(&std::fs::read_to_string(out).unwrap()).unwrap();
        assert_eq!(exported.lines.len(), 1);

        store.clean().unwrap();
        assert!(!store.exists());
    }

    #[test]
    fn test_import_rejects_duplicate_ids() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("input.json");
        let mut layer = sample_layer("sewer");
        let twin = layer.lines[0].clone();
        layer.lines.push(twin);
        std::fs::write(&file, serde_json::to_string(&layer).unwrap()).unwrap();

        let mut store = JsonFileStore::new(temp.path());
        assert!(matches!(
            store.import_file(&file, None, false),
            Err(StoreError::DuplicateFeature { .. })
        ));
        assert!(!store.has_layer("sewer").unwrap());
    }
}
