//! Error types for the store layer.

use std::path::PathBuf;

use pipenet_engine::NetworkError;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors reading from or writing to a feature store.
///
/// These are propagated to the caller as-is; nothing here retries.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The `.pipenet` directory does not exist.
    #[error("No .pipenet store found at {path}. Run `pnet import` first.")]
    StoreNotFound { path: PathBuf },

    /// No layer with this name.
    #[error("Layer not found: {layer}")]
    LayerNotFound { layer: String },

    /// Layer names become file names, so they are restricted to a safe alphabet.
    #[error("Invalid layer name {layer:?}: use letters, digits, '_', '-' and '.'")]
    InvalidLayerName { layer: String },

    /// A layer with this name already exists and overwriting was not requested.
    #[error("Layer already exists: {layer}")]
    LayerExists { layer: String },

    /// The layer holds a different geometry type than requested.
    #[error("Layer {layer} is not a {expected} layer")]
    WrongGeometry { layer: String, expected: String },

    /// An update referenced a feature id not present in the layer.
    #[error("Feature {id} not found in layer {layer}")]
    FeatureNotFound { layer: String, id: u64 },

    /// Two features in one layer share an id.
    #[error("Duplicate feature id {id} in layer {layer}")]
    DuplicateFeature { layer: String, id: u64 },

    /// An update wrote a field the layer does not declare.
    #[error("Field {field} not found in layer {layer}")]
    FieldNotFound { layer: String, field: String },

    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration or engine failure surfaced through a store operation.
    #[error(transparent)]
    Network(#[from] NetworkError),
}

impl StoreError {
    pub fn layer_not_found(layer: impl Into<String>) -> Self {
        Self::LayerNotFound {
            layer: layer.into(),
        }
    }
}
