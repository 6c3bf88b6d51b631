//! amdfw-core
//!
//! Core library for content-addressed ingestion of AMD firmware images.
//!
//! This crate defines the parsed component model, the schema normalizer, the
//! deduplicating blob store, the document database, and the ingestion
//! orchestrator that ties them together. The structural parser and the pattern
//! detector sit behind traits so the pipeline can be driven by other
//! implementations; reference implementations live in `services::backends`
//! and `services::detect`.
//!
//! The goal is to keep all substantive logic here so it is fully testable and
//! reusable from multiple frontends (CLI, queue consumers, etc.).

pub mod blobs;
mod bytes;
pub mod db;
pub mod model;
pub mod normalize;
pub mod services;

/// Returns the library version as encoded at compile time.
///
/// Useful for tests and for frontends to report consistent version info.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
