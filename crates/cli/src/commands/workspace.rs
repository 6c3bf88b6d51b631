use std::fs;

use amdfw_core::blobs::FsBlobStore;
use amdfw_core::db::{
    DocumentDb, WorkspaceConfig, WorkspaceLayout, ENTRY_COLLECTION, IMAGE_COLLECTION,
};
use amdfw_core::services::structure::default_parser_registry;
use anyhow::{bail, Context, Result};
use serde::Serialize;

use crate::commands::{open_workspace, print_dir_status};
use crate::{canonicalize_or_current, infer_workspace_name};

#[derive(Serialize)]
pub struct WorkspaceInfoSnapshot {
    pub name: String,
    pub description: Option<String>,
    pub root: String,
    pub config_file: String,
    pub config_version: String,
    pub db_path: String,
    pub blobs_dir: String,
    pub rules: Option<String>,
    pub pass_timeout_secs: Option<u64>,
    pub parsers: Vec<String>,
    pub detector_rules: usize,
    pub images: usize,
    pub entries: usize,
    pub blobs: usize,
    pub passes: usize,
}

/// Initialize a new workspace at `root`.
pub fn init_workspace_command(root: &str, name: Option<String>) -> Result<()> {
    let root_path = canonicalize_or_current(root)?;
    let layout = WorkspaceLayout::new(&root_path);
    if layout.config_path.exists() {
        bail!("Workspace already initialized at {}", layout.config_path.display());
    }

    let workspace_name = match name {
        Some(n) => n,
        None => infer_workspace_name(&root_path),
    };

    fs::create_dir_all(&layout.meta_dir)
        .with_context(|| format!("Failed to create meta dir: {}", layout.meta_dir.display()))?;

    let config = WorkspaceConfig::new(&workspace_name, &layout);
    let json = serde_json::to_string_pretty(&config)?;
    fs::write(&layout.config_path, json).with_context(|| {
        format!("Failed to write workspace config: {}", layout.config_path.display())
    })?;

    // Create the database and blob store now so later commands can rely on them.
    DocumentDb::open(&layout.db_path).with_context(|| {
        format!("Failed to initialize document database at {}", layout.db_path.display())
    })?;
    FsBlobStore::open(&layout.blobs_dir).with_context(|| {
        format!("Failed to initialize blob store at {}", layout.blobs_dir.display())
    })?;

    println!("Initialized firmware workspace:");
    println!("  Name: {}", workspace_name);
    println!("  Root: {}", layout.root.display());
    println!("  Config: {}", layout.config_path.display());
    println!("  DB path (relative): {}", config.db.path);
    println!("  Blobs dir (relative): {}", config.blobs_dir);

    Ok(())
}

/// Show basic information about an existing workspace.
pub fn workspace_info_command(root: &str, json: bool) -> Result<()> {
    let ctx = open_workspace(root)?;
    let images = ctx.db.count(IMAGE_COLLECTION).context("Failed to count images")?;
    let entries = ctx.db.count(ENTRY_COLLECTION).context("Failed to count entries")?;
    let blobs = ctx.blobs.count().context("Failed to count blobs")?;
    let passes = ctx.db.list_passes(None).context("Failed to list passes")?.len();
    let parsers = default_parser_registry().names();

    if json {
        let snapshot = WorkspaceInfoSnapshot {
            name: ctx.config.name.clone(),
            description: ctx.config.description.clone(),
            root: ctx.layout.root.display().to_string(),
            config_file: ctx.layout.config_path.display().to_string(),
            config_version: ctx.config.config_version.clone(),
            db_path: ctx.config.db.path.clone(),
            blobs_dir: ctx.config.blobs_dir.clone(),
            rules: ctx.config.rules.clone(),
            pass_timeout_secs: ctx.config.pass_timeout_secs,
            parsers,
            detector_rules: ctx.detector.rules().count(),
            images,
            entries,
            blobs,
            passes,
        };
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    println!("Firmware Workspace Info");
    println!("=======================");
    println!("Name: {}", ctx.config.name);
    println!("Root: {}", ctx.layout.root.display());
    println!("Config file: {}", ctx.layout.config_path.display());
    println!("Config version: {}", ctx.config.config_version);
    println!("DB path (config): {}", ctx.config.db.path);
    println!("Blobs dir (config): {}", ctx.config.blobs_dir);
    if let Some(rules) = &ctx.config.rules {
        println!("Rules file: {}", rules);
    }
    if let Some(secs) = ctx.config.pass_timeout_secs {
        println!("Pass timeout: {}s", secs);
    }
    println!("Parsers: {}", parsers.join(", "));
    println!();

    println!("Directories:");
    print_dir_status("Meta dir (.amdfw)", &ctx.layout.meta_dir);
    print_dir_status("Blobs dir", ctx.blobs.root());
    println!();
    println!("Images: {}", images);
    println!("Entries: {}", entries);
    println!("Blobs: {}", blobs);
    println!("Passes: {}", passes);

    Ok(())
}
