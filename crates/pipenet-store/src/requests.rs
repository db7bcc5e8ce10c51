//! Request DTOs for store-backed runs.
//!
//! Each request carries everything a run needs besides the configuration,
//! so the CLI and programmatic callers build them the same way.

use serde::{Deserialize, Serialize};

/// Enrich a line layer with adjacency, direction and material fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichRequest {
    /// Layer to read.
    pub input_layer: String,

    /// Name of the output copy. Defaults to `{input}_{suffix}`.
    #[serde(default)]
    pub output_layer: Option<String>,

    /// Write into the input layer instead of a copy.
    #[serde(default)]
    pub in_place: bool,

    /// Replace an existing output layer.
    #[serde(default)]
    pub overwrite: bool,
}

impl EnrichRequest {
    /// Enrich `input_layer` into the default output copy.
    pub fn new(input_layer: impl Into<String>) -> Self {
        Self {
            input_layer: input_layer.into(),
            output_layer: None,
            in_place: false,
            overwrite: false,
        }
    }

    /// Write to a named output layer.
    pub fn with_output(mut self, output_layer: impl Into<String>) -> Self {
        self.output_layer = Some(output_layer.into());
        self
    }

    /// Write into the input layer.
    pub fn in_place(mut self) -> Self {
        self.in_place = true;
        self
    }

    /// Replace the output layer if it exists.
    pub fn overwrite(mut self) -> Self {
        self.overwrite = true;
        self
    }
}

/// Assign point features to segment ends and count points along segments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointsRequest {
    /// Line layer that receives the point fields.
    pub line_layer: String,

    /// Point layer to search (manholes, cleanouts...).
    pub point_layer: String,
}

impl PointsRequest {
    pub fn new(line_layer: impl Into<String>, point_layer: impl Into<String>) -> Self {
        Self {
            line_layer: line_layer.into(),
            point_layer: point_layer.into(),
        }
    }
}

/// Copy a line attribute onto the points at the lines' ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollUpRequest {
    /// Point layer that receives the values.
    pub point_layer: String,

    /// Line layer to read values from.
    pub line_layer: String,

    /// Line attribute to collect.
    pub line_field: String,

    /// Point attribute to write.
    pub point_field: String,
}

impl RollUpRequest {
    pub fn new(
        point_layer: impl Into<String>,
        line_layer: impl Into<String>,
        line_field: impl Into<String>,
        point_field: impl Into<String>,
    ) -> Self {
        Self {
            point_layer: point_layer.into(),
            line_layer: line_layer.into(),
            line_field: line_field.into(),
            point_field: point_field.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enrich_request_builders() {
        let request = EnrichRequest::new("sewer").with_output("out").overwrite();
        assert_eq!(request.output_layer.as_deref(), Some("out"));
        assert!(request.overwrite);
        assert!(!request.in_place);
    }

    #[test]
    fn test_enrich_request_json_defaults() {
        let request: EnrichRequest = serde_json::from_str(r#"{"input_layer": "sewer"}"#).unwrap();
        assert_eq!(request.input_layer, "sewer");
        assert!(request.output_layer.is_none());
        assert!(!request.overwrite);
    }
}
