//! Content-addressed blob storage.
//!
//! `BlobStore` is the raw byte store keyed by `ContentId`. Deduplication is the
//! provided `put_if_absent` method: check first, then write, and if the check
//! itself fails, write anyway since writes never replace an existing blob.

use std::path::PathBuf;

use thiserror::Error;
use tracing::warn;

use crate::model::ContentId;

pub mod fs_store;

pub use fs_store::FsBlobStore;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("Blob {0} not found")]
    NotFound(ContentId),

    #[error("I/O error on blob {id} at {path}: {source}")]
    Io {
        id: ContentId,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Blob store root {path} is unusable: {source}")]
    Root {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience result type for blob operations.
pub type BlobResult<T> = Result<T, BlobError>;

/// Outcome of a deduplicating write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlobWrite {
    /// The blob was written by this call.
    Stored,
    /// A blob with this id already existed and was left untouched.
    AlreadyPresent,
}

/// Raw byte storage keyed by content id.
pub trait BlobStore: Send + Sync {
    /// Read the full blob.
    fn get(&self, id: &ContentId) -> BlobResult<Vec<u8>>;

    /// Whether a blob with this id exists.
    fn exists(&self, id: &ContentId) -> BlobResult<bool>;

    /// Write `bytes` under `id` without replacing an existing blob.
    ///
    /// Implementations must be safe against a concurrent writer of the same id
    /// and report the loser as `AlreadyPresent`.
    fn put(&self, id: &ContentId, bytes: &[u8]) -> BlobResult<BlobWrite>;

    /// Store `bytes` at most once.
    fn put_if_absent(&self, id: &ContentId, bytes: &[u8]) -> BlobResult<BlobWrite> {
        match self.exists(id) {
            Ok(true) => return Ok(BlobWrite::AlreadyPresent),
            Ok(false) => {}
            Err(err) => {
                warn!(blob = %id, error = %err, "existence check failed; writing anyway");
            }
        }
        self.put(id, bytes)
    }
}
