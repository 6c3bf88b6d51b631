use std::path::Path;

use amdfw_core::blobs::BlobWrite;
use amdfw_core::db::{DocumentStore, COMPONENT_TREE_FIELD, ENTRY_COLLECTION, IMAGE_COLLECTION};
use anyhow::{anyhow, Context, Result};
use serde_json::Value;

use crate::commands::{open_workspace, parse_content_id};
use crate::read_image_file;

/// Store a firmware image and create its document.
pub fn add_image_command(root: &str, path: &str, name: Option<String>) -> Result<()> {
    let ctx = open_workspace(root)?;
    let (abs_path, bytes) = read_image_file(&ctx.layout.root, path)?;

    let image_name = name.unwrap_or_else(|| {
        Path::new(path).file_name().and_then(|os| os.to_str()).unwrap_or(path).to_string()
    });

    let registration =
        ctx.register(&bytes, Some(&image_name)).context("Failed to register image")?;

    println!("Added image:");
    println!("  Id: {}", registration.image.id);
    println!("  Name: {}", image_name);
    println!("  Source: {}", abs_path.display());
    println!("  Size: {} bytes", bytes.len());
    println!(
        "  Blob: {}",
        match registration.blob {
            BlobWrite::Stored => "stored",
            BlobWrite::AlreadyPresent => "already present",
        }
    );
    if !registration.created {
        println!("  Document: already registered (left unchanged)");
    }

    Ok(())
}

/// Print an image document as JSON.
pub fn show_image_command(root: &str, id: &str) -> Result<()> {
    let ctx = open_workspace(root)?;
    let id = parse_content_id(id)?;
    let doc = ctx
        .db
        .get(IMAGE_COLLECTION, &id)
        .context("Failed to load image document")?
        .ok_or_else(|| anyhow!("Image {} is not registered", id))?;
    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(())
}

/// List all registered images.
pub fn list_images_command(root: &str, json: bool) -> Result<()> {
    let ctx = open_workspace(root)?;
    let images = ctx.db.list(IMAGE_COLLECTION).context("Failed to list images")?;

    if json {
        let bodies: Vec<&Value> = images.iter().map(|d| &d.body).collect();
        println!("{}", serde_json::to_string_pretty(&bodies)?);
        return Ok(());
    }

    println!("Images:");
    if images.is_empty() {
        println!("(none)");
        return Ok(());
    }
    for image in images {
        let name = image.body.get("Name").and_then(Value::as_str).unwrap_or("(unnamed)");
        let size = image.body.get("Size").and_then(Value::as_u64).unwrap_or_default();
        let analysed = image.body.get(COMPONENT_TREE_FIELD).is_some();
        println!(
            "- {} {} ({} bytes, {})",
            image.id,
            name,
            size,
            if analysed { "analysed" } else { "not analysed" }
        );
    }

    Ok(())
}

/// List all indexed component entries.
pub fn list_entries_command(root: &str, json: bool) -> Result<()> {
    let ctx = open_workspace(root)?;
    let entries = ctx.db.list(ENTRY_COLLECTION).context("Failed to list entries")?;

    if json {
        let bodies: Vec<&Value> = entries.iter().map(|d| &d.body).collect();
        println!("{}", serde_json::to_string_pretty(&bodies)?);
        return Ok(());
    }

    println!("Entries:");
    if entries.is_empty() {
        println!("(none)");
        return Ok(());
    }
    for entry in entries {
        let field = |key: &str| entry.body.get(key).and_then(Value::as_str).unwrap_or("-");
        let name = entry
            .body
            .get("TypeInfo")
            .and_then(|info| info.get("Name"))
            .and_then(Value::as_str)
            .unwrap_or("(unknown type)");
        println!(
            "- {} type {} {} size {} version {}",
            entry.id.short(),
            field("Type"),
            name,
            field("Size"),
            field("Version")
        );
    }

    Ok(())
}
