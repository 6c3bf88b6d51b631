//! Work intake: registering firmware images before they are analysed.
//!
//! Registration stores the raw image in the blob store and creates its parent
//! document. The parent is only created when absent, so re-registering an
//! image never clobbers a component tree written by an earlier pass.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::blobs::{BlobError, BlobStore, BlobWrite};
use crate::db::{DbError, DocumentStore, IMAGE_COLLECTION, IMAGE_DOC_TYPE};
use crate::model::{ContentId, FirmwareImage};

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("Failed to store image blob: {0}")]
    Blob(#[from] BlobError),

    #[error("Failed to create image document: {0}")]
    Store(#[from] DbError),

    #[error("Failed to serialize image document: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Initial shape of a firmware image document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImageDocument {
    #[serde(rename = "ID")]
    pub id: ContentId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub size: u64,
    pub imported_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub image: FirmwareImage,
    pub blob: BlobWrite,
    /// Whether a new image document was created.
    pub created: bool,
}

/// Store `bytes` and create the image document if it does not exist yet.
pub fn register_image(
    blobs: &dyn BlobStore,
    documents: &dyn DocumentStore,
    bytes: &[u8],
    name: Option<&str>,
) -> Result<Registration, IntakeError> {
    let id = ContentId::of(bytes);
    let blob = blobs.put_if_absent(&id, bytes)?;

    let created = if documents.exists(IMAGE_COLLECTION, &id)? {
        false
    } else {
        let doc = ImageDocument {
            id: id.clone(),
            name: name.map(str::to_string),
            size: bytes.len() as u64,
            imported_at: Utc::now().to_rfc3339(),
        };
        documents.upsert(IMAGE_COLLECTION, IMAGE_DOC_TYPE, &id, &serde_json::to_value(&doc)?)?;
        true
    };

    info!(image = %id.short(), ?blob, created, "registered image");
    Ok(Registration { image: FirmwareImage::new(id), blob, created })
}
