//! CLI command implementations.

pub mod config;
pub mod enrich;
pub mod layers;
