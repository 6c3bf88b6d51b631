use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::blobs::FsBlobStore;
use crate::db::{DocumentDb, WorkspaceConfig, WorkspaceLayout};
use crate::services::detect::RuleScanner;

/// Load the workspace config JSON from disk for a given layout.
pub fn load_workspace_config(layout: &WorkspaceLayout) -> Result<WorkspaceConfig> {
    let config_json = std::fs::read_to_string(&layout.config_path).with_context(|| {
        format!("Failed to read workspace config at {}", layout.config_path.display())
    })?;
    let config: WorkspaceConfig =
        serde_json::from_str(&config_json).context("Failed to parse workspace config JSON")?;
    Ok(config)
}

/// Resolve the DB path (respecting relative/absolute config) and open a DocumentDb.
pub fn open_document_db(
    layout: &WorkspaceLayout,
) -> Result<(WorkspaceConfig, PathBuf, DocumentDb)> {
    let config = load_workspace_config(layout)?;
    let db_path = layout.resolve(&config.db.path);
    let db = DocumentDb::open(&db_path)
        .with_context(|| format!("Failed to open document database at {}", db_path.display()))?;
    Ok((config, db_path, db))
}

/// Open the blob store directory configured for the workspace.
pub fn open_blob_store(layout: &WorkspaceLayout, config: &WorkspaceConfig) -> Result<FsBlobStore> {
    let dir = layout.resolve(&config.blobs_dir);
    FsBlobStore::open(&dir)
        .with_context(|| format!("Failed to open blob store at {}", dir.display()))
}

/// Compile the detector rules: the configured file, else `.amdfw/rules.yaml`
/// when present, else the built-in rules.
pub fn load_detector(layout: &WorkspaceLayout, config: &WorkspaceConfig) -> Result<RuleScanner> {
    let path = match &config.rules {
        Some(configured) => Some(layout.resolve(configured)),
        None => layout.rules_path.is_file().then(|| layout.rules_path.clone()),
    };
    match path {
        Some(path) => RuleScanner::from_file(&path)
            .with_context(|| format!("Failed to load detector rules from {}", path.display())),
        None => RuleScanner::builtin().context("Failed to compile built-in detector rules"),
    }
}
