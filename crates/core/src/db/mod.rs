//! Document database integration and workspace layout definitions.
//!
//! This module wraps a SQLite database storing:
//! - Documents in named collections (firmware images, component entries),
//!   keyed by content id and stored as JSON bodies.
//! - Analysis pass bookkeeping.
//!
//! It also defines:
//! - `WorkspaceConfig`: serializable workspace metadata.
//! - `WorkspaceLayout`: computed paths for workspace directories/files.
//! - `WorkspaceContext`: an opened workspace (database, blob store, detector).

pub mod config;
pub mod context;
pub mod document_db;
pub mod layout;
pub mod models;
pub mod util;

pub use config::*;
pub use context::*;
pub use document_db::*;
pub use layout::*;
pub use models::*;
pub use util::*;
