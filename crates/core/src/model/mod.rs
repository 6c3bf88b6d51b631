//! Core data model for firmware images and the components parsed out of them.
//!
//! - `ContentId`: the content address used as both dedup key and record key.
//! - `FirmwareImage`: the unit of work handed to the ingestion pipeline.
//! - `DetectedSignature`: a pattern hit produced by the detector.
//! - `forest`: the parsed directory tree (entry table, ROMs, directories) and
//!   the arena of component entries it references.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub mod forest;

pub use forest::*;

/// Length of the hex rendering of a SHA-256 digest.
const CONTENT_ID_LEN: usize = 64;

/// Deterministic identifier of a byte sequence (lowercase hex SHA-256).
///
/// Two blobs with the same bytes always get the same id, across processes and
/// restarts. The empty sequence has a valid id like any other.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentId(String);

impl ContentId {
    /// Compute the content id of `bytes`.
    pub fn of(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        Self(format!("{:x}", digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix for log lines and human-readable listings.
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentId({})", self.0)
    }
}

/// Error returned when a string is not a well-formed content id.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid content id '{0}': expected 64 lowercase hex characters")]
pub struct InvalidContentId(pub String);

impl FromStr for ContentId {
    type Err = InvalidContentId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let well_formed = s.len() == CONTENT_ID_LEN
            && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if well_formed {
            Ok(Self(s.to_string()))
        } else {
            Err(InvalidContentId(s.to_string()))
        }
    }
}

impl TryFrom<String> for ContentId {
    type Error = InvalidContentId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ContentId> for String {
    fn from(id: ContentId) -> Self {
        id.0
    }
}

/// Reference to a firmware image, as delivered by the work intake.
///
/// The image's raw bytes live in the blob store under `id`. Unknown payload
/// fields are ignored so producers can attach their own metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareImage {
    #[serde(rename = "ID")]
    pub id: ContentId,
}

impl FirmwareImage {
    pub fn new(id: ContentId) -> Self {
        Self { id }
    }
}

/// A pattern hit found in a firmware image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedSignature {
    /// Name of the rule that matched (e.g. `AGESA`).
    pub rule: String,
    /// Byte offset of the match within the image.
    pub offset: u64,
    /// The matched bytes, escaped as printable ASCII.
    pub matched: String,
    /// A short escaped excerpt of the image starting at `offset`.
    pub excerpt: String,
}
