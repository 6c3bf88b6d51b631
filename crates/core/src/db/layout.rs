use std::path::{Path, PathBuf};

/// Logical layout of a workspace on disk.
///
/// This is derived from a chosen root path. It does *not* perform any IO itself.
/// The CLI or other frontends are responsible for actually creating directories
/// and files based on this layout.
#[derive(Debug, Clone)]
pub struct WorkspaceLayout {
    /// Root directory of the workspace.
    pub root: PathBuf,
    /// Directory for internal metadata (.amdfw).
    pub meta_dir: PathBuf,
    /// Path to the workspace config file (JSON).
    pub config_path: PathBuf,
    /// Path to the document database file.
    pub db_path: PathBuf,
    /// Directory holding content-addressed blobs.
    pub blobs_dir: PathBuf,
    /// Default location of the detector rule file.
    pub rules_path: PathBuf,
}

impl WorkspaceLayout {
    /// Compute the default layout for a workspace rooted at `root`.
    ///
    /// This does *not* touch the filesystem.
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let meta_dir = root.join(".amdfw");
        let config_path = meta_dir.join("workspace.json");
        let db_path = meta_dir.join("documents.db");
        let blobs_dir = meta_dir.join("blobs");
        let rules_path = meta_dir.join("rules.yaml");

        Self { root, meta_dir, config_path, db_path, blobs_dir, rules_path }
    }

    /// Express `path` relative to `root` when it lives under it.
    pub fn relative_string(&self, path: &Path) -> String {
        match path.strip_prefix(&self.root) {
            Ok(rel) => rel.to_string_lossy().to_string(),
            Err(_) => path.to_string_lossy().to_string(),
        }
    }

    /// Resolve a config path against `root` unless it is already absolute.
    pub fn resolve(&self, configured: &str) -> PathBuf {
        let path = Path::new(configured);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::WorkspaceLayout;

    #[test]
    fn layout_paths_hang_off_the_meta_dir() {
        let layout = WorkspaceLayout::new("/work/fw");
        assert_eq!(layout.relative_string(&layout.db_path), ".amdfw/documents.db");
        assert_eq!(layout.resolve(".amdfw/blobs"), layout.blobs_dir);
        assert_eq!(layout.resolve("/abs/blobs").to_string_lossy(), "/abs/blobs");
    }
}
