use serde::{Deserialize, Serialize};

use crate::model::ContentId;

/// Collection holding one document per firmware image.
pub const IMAGE_COLLECTION: &str = "flashimages";
/// Document type of firmware image documents.
pub const IMAGE_DOC_TYPE: &str = "flashimage";
/// Collection holding one document per distinct component entry.
pub const ENTRY_COLLECTION: &str = "amdentries";
/// Document type of component entry documents.
pub const ENTRY_DOC_TYPE: &str = "amdentry";
/// Field on an image document that carries the analysed component tree.
pub const COMPONENT_TREE_FIELD: &str = "AMD";

/// Final status of an analysis pass.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PassStatus {
    Succeeded,
    Failed,
    Cancelled,
}

impl PassStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PassStatus::Succeeded => "succeeded",
            PassStatus::Failed => "failed",
            PassStatus::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for PassStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "succeeded" => Ok(PassStatus::Succeeded),
            "failed" => Ok(PassStatus::Failed),
            "cancelled" => Ok(PassStatus::Cancelled),
            other => Err(format!("unknown pass status '{other}'")),
        }
    }
}

/// Record describing one analysis pass for bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PassRecord {
    pub image: ContentId,
    pub status: PassStatus,
    pub signatures: usize,
    pub forest_present: bool,
    pub entries_persisted: usize,
    pub entries_failed: usize,
    pub error: Option<String>,
    pub started_at: String,
    pub finished_at: String,
}
