use serde::{Deserialize, Serialize};

use crate::db::WorkspaceLayout;

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    /// Path to the document database file (typically relative to workspace root).
    pub path: String,
}

impl DbConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

/// Serializable configuration describing a firmware analysis workspace.
///
/// This lives at `.amdfw/workspace.json` in the workspace root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Human-friendly workspace name.
    pub name: String,
    /// Optional description / notes.
    pub description: Option<String>,
    /// Schema/config version. This is about the config format, not firmware versions.
    pub config_version: String,
    /// Database configuration (path is typically relative to workspace root).
    pub db: DbConfig,
    /// Blob store directory (typically relative to workspace root).
    pub blobs_dir: String,
    /// Optional detector rule file; built-in rules are used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<String>,
    /// Abandon a pass that runs longer than this many seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pass_timeout_secs: Option<u64>,
}

impl WorkspaceConfig {
    /// Create a new workspace configuration with the layout's default paths.
    pub fn new(name: impl Into<String>, layout: &WorkspaceLayout) -> Self {
        Self {
            name: name.into(),
            description: None,
            config_version: "0.1.0".to_string(),
            db: DbConfig::new(layout.relative_string(&layout.db_path)),
            blobs_dir: layout.relative_string(&layout.blobs_dir),
            rules: None,
            pass_timeout_secs: None,
        }
    }
}
