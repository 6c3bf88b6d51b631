use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub mod commands;

/// Canonicalize the root path if possible, falling back to the given string
/// relative to the current working directory.
pub fn canonicalize_or_current(root: &str) -> Result<PathBuf> {
    let path = Path::new(root);
    if path == Path::new(".") {
        Ok(env::current_dir().context("Failed to get current directory")?)
    } else {
        // Not-yet-existing paths cannot be canonicalized; anchor them at the cwd.
        match path.canonicalize() {
            Ok(p) => Ok(p),
            Err(_) => {
                let cwd = env::current_dir().context("Failed to get current directory")?;
                Ok(cwd.join(path))
            }
        }
    }
}

/// Infer a workspace name from the root path.
///
/// If the root has no final component (e.g., `/`), fallback to `unnamed-workspace`.
pub fn infer_workspace_name(root: &Path) -> String {
    root.file_name().and_then(|os_str| os_str.to_str()).unwrap_or("unnamed-workspace").to_string()
}

/// Read a firmware image from disk, resolving relative paths against `root`.
pub fn read_image_file(root: &Path, path: &str) -> Result<(PathBuf, Vec<u8>)> {
    let input = Path::new(path);
    let abs_path = if input.is_absolute() { input.to_path_buf() } else { root.join(input) };
    let bytes = std::fs::read(&abs_path)
        .with_context(|| format!("Failed to read firmware image {}", abs_path.display()))?;
    Ok((abs_path, bytes))
}
