use std::path::Path;

use amdfw_core::db::{WorkspaceContext, WorkspaceLayout};
use amdfw_core::model::ContentId;
use anyhow::{Context, Result};

use crate::canonicalize_or_current;

/// Resolve `root` and open the workspace rooted there.
pub fn open_workspace(root: &str) -> Result<WorkspaceContext> {
    let root_path = canonicalize_or_current(root)?;
    let layout = WorkspaceLayout::new(&root_path);
    if !layout.config_path.is_file() {
        anyhow::bail!(
            "No workspace at {} (missing {}); run init-workspace first",
            root_path.display(),
            layout.config_path.display()
        );
    }
    WorkspaceContext::from_root(&root_path)
}

/// Parse a content id given on the command line.
pub fn parse_content_id(raw: &str) -> Result<ContentId> {
    raw.trim().parse().with_context(|| format!("Invalid image id '{raw}'"))
}

/// Helper to print whether a directory exists.
pub fn print_dir_status(label: &str, path: &Path) {
    let exists = path.is_dir();
    println!("- {label}: {} ({})", if exists { "OK" } else { "MISSING" }, path.display());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_content_id_trims_and_validates() {
        let id = ContentId::of(b"x");
        let padded = format!("  {id}\n");
        assert_eq!(parse_content_id(&padded).unwrap(), id);
        let err = parse_content_id("nope").unwrap_err();
        assert!(err.to_string().contains("Invalid image id"));
    }
}
