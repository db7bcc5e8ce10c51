//! Feature-store boundary for pipenet.
//!
//! The engine computes over plain feature values; this crate moves those values in
//! and out of named layers and writes the derived fields back.
//!
//! ## Architecture
//!
//! - **FeatureStore**: whole-layer load/save plus the bulk operations built on them
//!   ([`MemoryStore`] for tests and embedding, [`JsonFileStore`] on disk)
//! - **Writer**: output field declarations and attribute updates
//! - **PipenetOps**: request/response runs (enrich, point assignment, roll-up)
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pipenet_engine::EnrichConfig;
//! use pipenet_store::{EnrichRequest, JsonFileStore, PipenetOps};
//!
//! fn main() -> anyhow::Result<()> {
//!     let store = JsonFileStore::open(".")?;
//!     let mut ops = PipenetOps::new(store, EnrichConfig::default());
//!
//!     let response = ops.enrich(&EnrichRequest::new("sewer_lines"))?;
//!     println!("wrote {} features to {}", response.updated, response.output_layer);
//!     Ok(())
//! }
//! ```

mod context;
mod error;
mod file_store;
mod layer;
mod report;
mod requests;
mod responses;
mod store;
mod writer;

pub use context::PipenetOps;
pub use error::{StoreError, StoreResult};
pub use file_store::{JsonFileStore, StoreStats, PIPENET_DIR};
pub use layer::{FeatureUpdate, Layer, LayerInfo, LayerKind};
pub use report::{RunKind, RunReport};
pub use requests::*;
pub use responses::*;
pub use store::{FeatureStore, MemoryStore};
pub use writer::Writer;
