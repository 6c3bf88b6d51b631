use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::blobs::{BlobError, BlobResult, BlobStore, BlobWrite};
use crate::model::ContentId;

/// Filesystem blob store: `<root>/<first two hex chars>/<id>`.
///
/// Writes go to a temp file in the shard directory and are moved into place
/// with a no-clobber rename, so readers never see partial blobs and an
/// existing blob is never replaced.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Open (or create) a blob store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> BlobResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .map_err(|source| BlobError::Root { path: root.clone(), source })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path a blob with this id lives at (whether or not it exists).
    pub fn blob_path(&self, id: &ContentId) -> PathBuf {
        let s = id.as_str();
        self.root.join(&s[..2]).join(s)
    }

    /// Count stored blobs by walking the shard directories.
    pub fn count(&self) -> BlobResult<usize> {
        let root_err = |source| BlobError::Root { path: self.root.clone(), source };
        let mut total = 0;
        for shard in fs::read_dir(&self.root).map_err(root_err)? {
            let shard = shard.map_err(root_err)?;
            if !shard.file_type().map_err(root_err)?.is_dir() {
                continue;
            }
            for blob in fs::read_dir(shard.path()).map_err(root_err)? {
                let blob = blob.map_err(root_err)?;
                let name = blob.file_name();
                if name.to_str().is_some_and(|n| n.parse::<ContentId>().is_ok()) {
                    total += 1;
                }
            }
        }
        Ok(total)
    }
}

impl BlobStore for FsBlobStore {
    fn get(&self, id: &ContentId) -> BlobResult<Vec<u8>> {
        let path = self.blob_path(id);
        fs::read(&path).map_err(|source| {
            if source.kind() == ErrorKind::NotFound {
                BlobError::NotFound(id.clone())
            } else {
                BlobError::Io { id: id.clone(), path, source }
            }
        })
    }

    fn exists(&self, id: &ContentId) -> BlobResult<bool> {
        let path = self.blob_path(id);
        path.try_exists().map_err(|source| BlobError::Io { id: id.clone(), path, source })
    }

    fn put(&self, id: &ContentId, bytes: &[u8]) -> BlobResult<BlobWrite> {
        let path = self.blob_path(id);
        let io_err = |source| BlobError::Io { id: id.clone(), path: path.clone(), source };

        let shard = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(shard).map_err(io_err)?;

        let mut tmp = NamedTempFile::new_in(shard).map_err(io_err)?;
        tmp.write_all(bytes).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;

        match tmp.persist_noclobber(&path) {
            Ok(_) => {
                debug!(blob = %id, size = bytes.len(), "stored blob");
                Ok(BlobWrite::Stored)
            }
            Err(err) if err.error.kind() == ErrorKind::AlreadyExists => {
                debug!(blob = %id, "blob appeared concurrently; keeping existing copy");
                Ok(BlobWrite::AlreadyPresent)
            }
            Err(err) => Err(io_err(err.error)),
        }
    }
}
