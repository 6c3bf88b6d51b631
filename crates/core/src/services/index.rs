//! Writers for the two document shapes a pass produces.
//!
//! `EntryIndexer` upserts one record per component; `ParentUpdater` sets the
//! component-tree field on the image document and touches nothing else.

use serde::Serialize;
use thiserror::Error;

use crate::db::{
    DbError, DocumentStore, COMPONENT_TREE_FIELD, ENTRY_COLLECTION, ENTRY_DOC_TYPE,
    IMAGE_COLLECTION,
};
use crate::model::ContentId;
use crate::normalize::{ComponentTreeRecord, EntryRecord};

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] DbError),
}

fn to_value<T: Serialize>(record: &T) -> Result<serde_json::Value, IndexError> {
    Ok(serde_json::to_value(record)?)
}

/// Upserts entry records into a collection, keyed by content id.
pub struct EntryIndexer<'a> {
    pub store: &'a dyn DocumentStore,
    pub collection: &'a str,
    pub doc_type: &'a str,
}

impl<'a> EntryIndexer<'a> {
    /// Indexer for the default entry collection.
    pub fn new(store: &'a dyn DocumentStore) -> Self {
        Self { store, collection: ENTRY_COLLECTION, doc_type: ENTRY_DOC_TYPE }
    }

    /// Replace the whole record for `record.id`; repeated calls are no-ops in effect.
    pub fn upsert(&self, record: &EntryRecord) -> Result<(), IndexError> {
        let body = to_value(record)?;
        self.store.upsert(self.collection, self.doc_type, &record.id, &body)?;
        Ok(())
    }
}

/// Writes a pass result onto the parent image document.
pub struct ParentUpdater<'a> {
    pub store: &'a dyn DocumentStore,
    pub collection: &'a str,
    pub field: &'a str,
}

impl<'a> ParentUpdater<'a> {
    pub fn new(store: &'a dyn DocumentStore) -> Self {
        Self { store, collection: IMAGE_COLLECTION, field: COMPONENT_TREE_FIELD }
    }

    /// Replace the tree field of `image`; fails if the image document is missing.
    pub fn update(&self, image: &ContentId, tree: &ComponentTreeRecord) -> Result<(), IndexError> {
        let value = to_value(tree)?;
        self.store.partial_update(self.collection, image, self.field, &value)?;
        Ok(())
    }
}
