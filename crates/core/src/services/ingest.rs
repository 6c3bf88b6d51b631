//! Ingestion orchestrator: one analysis pass over one firmware image.
//!
//! A pass moves through `Fetching → Detecting → Parsing → WalkingTree →
//! UpdatingParent` and ends in `Done` or `Failed`. Only a fetch failure, a
//! parent update failure, or cancellation fail the pass; detector, parser and
//! per-entry problems are logged, recorded in the report, and skipped.
//!
//! Every write is idempotent (content-addressed blobs, keyed upserts, a
//! whole-field parent update), so a redelivered image can simply be re-run.

use std::collections::HashSet;
use std::fmt;
use std::ops::ControlFlow;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn};

use crate::blobs::{BlobError, BlobStore, BlobWrite};
use crate::db::{DocumentStore, PassRecord, PassStatus};
use crate::model::{ComponentEntry, ContentId, DetectedSignature, DirectoryForest};
use crate::normalize::{entry_record, hex, tree_record};
use crate::services::detect::{PatternDetector, PatternMatch};
use crate::services::index::{EntryIndexer, IndexError, ParentUpdater};
use crate::services::structure::{StructureError, StructureParser};

pub use crate::services::deadline::PassDeadline;

/// Bytes of image context kept with each detected signature.
pub const EXCERPT_LEN: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PassState {
    Fetching,
    Detecting,
    Parsing,
    WalkingTree,
    UpdatingParent,
    Done,
    Failed,
}

impl PassState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PassState::Fetching => "fetching",
            PassState::Detecting => "detecting",
            PassState::Parsing => "parsing",
            PassState::WalkingTree => "walking-tree",
            PassState::UpdatingParent => "updating-parent",
            PassState::Done => "done",
            PassState::Failed => "failed",
        }
    }
}

impl fmt::Display for PassState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where handling of a single entry failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStage {
    Normalize,
    Blob,
    Index,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum EntryOutcome {
    Persisted { blob: BlobWrite },
    /// Same content id was already persisted earlier in this pass.
    AlreadyIngested,
    /// The slot points at no bytes (value entry, out of range, zero size).
    NoPayload,
    Failed { stage: EntryStage, message: String },
}

/// Outcome for one walked directory slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryReport {
    /// `None` exactly when the outcome is `NoPayload`.
    pub entry: Option<ContentId>,
    pub location: u64,
    pub type_code: u8,
    #[serde(flatten)]
    pub outcome: EntryOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub image: ContentId,
    pub state: PassState,
    pub signatures: Vec<DetectedSignature>,
    pub forest_present: bool,
    pub entries: Vec<EntryReport>,
    pub parent_updated: bool,
    /// Structural problems that were skipped over.
    pub parse_errors: Vec<String>,
    pub detect_error: Option<String>,
}

impl PassReport {
    pub fn new(image: ContentId) -> Self {
        Self {
            image,
            state: PassState::Fetching,
            signatures: Vec::new(),
            forest_present: false,
            entries: Vec::new(),
            parent_updated: false,
            parse_errors: Vec::new(),
            detect_error: None,
        }
    }

    /// Slots whose entry was written (or found already stored) by this pass.
    pub fn persisted(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, EntryOutcome::Persisted { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.entries.iter().filter(|e| matches!(e.outcome, EntryOutcome::Failed { .. })).count()
    }

    /// Blobs newly written by this pass (excludes the image itself).
    pub fn blobs_stored(&self) -> usize {
        let stored = EntryOutcome::Persisted { blob: BlobWrite::Stored };
        self.entries.iter().filter(|e| e.outcome == stored).count()
    }

    /// Bookkeeping row for this pass.
    pub fn to_record(
        &self,
        status: PassStatus,
        error: Option<String>,
        started_at: String,
        finished_at: String,
    ) -> PassRecord {
        PassRecord {
            image: self.image.clone(),
            status,
            signatures: self.signatures.len(),
            forest_present: self.forest_present,
            entries_persisted: self.persisted(),
            entries_failed: self.failed(),
            error,
            started_at,
            finished_at,
        }
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Failed to fetch image {image}: {source}")]
    Fetch {
        image: ContentId,
        #[source]
        source: BlobError,
    },

    #[error("Failed to update image {image}: {source}")]
    ParentUpdate {
        image: ContentId,
        #[source]
        source: IndexError,
        report: Box<PassReport>,
    },

    #[error("Pass on image {image} cancelled while {state}")]
    Cancelled { image: ContentId, state: PassState, report: Box<PassReport> },
}

impl IngestError {
    pub fn image(&self) -> &ContentId {
        match self {
            IngestError::Fetch { image, .. }
            | IngestError::ParentUpdate { image, .. }
            | IngestError::Cancelled { image, .. } => image,
        }
    }

    /// Partial report, when the pass got far enough to produce one.
    pub fn report(&self) -> Option<&PassReport> {
        match self {
            IngestError::Fetch { .. } => None,
            IngestError::ParentUpdate { report, .. } | IngestError::Cancelled { report, .. } => {
                Some(report)
            }
        }
    }

    pub fn status(&self) -> PassStatus {
        match self {
            IngestError::Cancelled { .. } => PassStatus::Cancelled,
            _ => PassStatus::Failed,
        }
    }
}

/// Turn a detector hit into a stored signature with surrounding context.
pub fn detected_signature(bytes: &[u8], hit: &PatternMatch) -> DetectedSignature {
    let start = hit.offset.min(bytes.len());
    let end = start.saturating_add(EXCERPT_LEN).min(bytes.len());
    DetectedSignature {
        rule: hit.rule.clone(),
        offset: hit.offset as u64,
        matched: hit.matched.escape_ascii().to_string(),
        excerpt: bytes[start..end].escape_ascii().to_string(),
    }
}

/// Runs passes against injected collaborators; holds no state between passes.
pub struct Orchestrator<'a> {
    pub blobs: &'a dyn BlobStore,
    pub documents: &'a dyn DocumentStore,
    pub detector: &'a dyn PatternDetector,
    pub parser: &'a dyn StructureParser,
}

impl<'a> Orchestrator<'a> {
    pub fn run(
        &self,
        image: &ContentId,
        deadline: &PassDeadline,
    ) -> Result<PassReport, IngestError> {
        let span = info_span!("pass", image = %image.short());
        let _guard = span.enter();
        let mut report = PassReport::new(image.clone());

        if deadline.expired() {
            return Err(cancelled(report));
        }
        let bytes = self.blobs.get(image).map_err(|source| {
            error!(error = %source, "could not fetch image");
            IngestError::Fetch { image: image.clone(), source }
        })?;

        report.state = PassState::Detecting;
        if deadline.expired() {
            return Err(cancelled(report));
        }
        match self.detector.scan(&bytes) {
            Ok(hits) => {
                for hit in &hits {
                    debug!(rule = %hit.rule, offset = %hex(&(hit.offset as u32)), "signature");
                }
                report.signatures =
                    hits.iter().map(|hit| detected_signature(&bytes, hit)).collect();
            }
            Err(err) => {
                warn!(error = %err, "pattern detection failed; continuing without signatures");
                report.detect_error = Some(err.to_string());
            }
        }

        report.state = PassState::Parsing;
        if deadline.expired() {
            return Err(cancelled(report));
        }
        let forest = self.parse(&bytes, deadline, &mut report);
        report.forest_present = forest.is_some();
        if deadline.expired() {
            return Err(cancelled(report));
        }

        if forest.is_none() && report.signatures.is_empty() {
            info!("no signatures and no firmware structure; nothing to record");
            report.state = PassState::Done;
            return Ok(report);
        }

        if let Some(forest) = &forest {
            report.state = PassState::WalkingTree;
            if self.walk(forest, deadline, &mut report).is_break() {
                return Err(cancelled(report));
            }
        }

        report.state = PassState::UpdatingParent;
        if deadline.expired() {
            return Err(cancelled(report));
        }
        let tree = tree_record(&report.signatures, forest.as_ref());
        if let Err(source) = ParentUpdater::new(self.documents).update(image, &tree) {
            error!(error = %source, "could not update image document");
            report.state = PassState::Failed;
            return Err(IngestError::ParentUpdate {
                image: image.clone(),
                source,
                report: Box::new(report),
            });
        }
        report.parent_updated = true;
        report.state = PassState::Done;
        info!(
            signatures = report.signatures.len(),
            persisted = report.persisted(),
            failed = report.failed(),
            "pass complete"
        );
        Ok(report)
    }

    /// Structural parse; every failure here degrades the forest instead of the pass.
    fn parse(
        &self,
        bytes: &[u8],
        deadline: &PassDeadline,
        report: &mut PassReport,
    ) -> Option<DirectoryForest> {
        let offset = match self.parser.find_entry_table(bytes) {
            Ok(offset) => offset,
            Err(StructureError::EntryTableNotFound) => {
                info!("no firmware entry table");
                return None;
            }
            Err(err) => {
                warn!(error = %err, "entry table search failed");
                report.parse_errors.push(err.to_string());
                return None;
            }
        };
        info!(location = %hex(&(offset as u32)), "found firmware entry table");

        let table = match self.parser.parse_entry_table(bytes, offset) {
            Ok(table) => table,
            Err(err) => {
                warn!(error = %err, "could not read firmware entry table");
                report.parse_errors.push(err.to_string());
                return None;
            }
        };

        let mapping = match self.parser.flash_mapping(bytes, &table) {
            Ok(mapping) => mapping,
            Err(err) => {
                warn!(error = %err, "could not determine flash mapping");
                report.parse_errors.push(err.to_string());
                return Some(DirectoryForest::table_only(table));
            }
        };

        let parsed = self.parser.parse_roms(bytes, &table, mapping, deadline);
        for err in &parsed.errors {
            warn!(error = %err, "directory parse error");
            report.parse_errors.push(err.to_string());
        }
        Some(DirectoryForest {
            table,
            flash_mapping: Some(mapping),
            roms: parsed.roms,
            entries: parsed.entries,
        })
    }

    fn walk(
        &self,
        forest: &DirectoryForest,
        deadline: &PassDeadline,
        report: &mut PassReport,
    ) -> ControlFlow<()> {
        let mut persisted: HashSet<&ContentId> = HashSet::new();
        for (_, _, slot) in forest.slots() {
            if deadline.expired() {
                return ControlFlow::Break(());
            }
            let Some(id) = slot.entry.as_ref() else {
                debug!(
                    location = %hex(&slot.location),
                    type_code = %hex(&slot.type_code),
                    "slot has no payload"
                );
                report.entries.push(EntryReport {
                    entry: None,
                    location: slot.location,
                    type_code: slot.type_code,
                    outcome: EntryOutcome::NoPayload,
                });
                continue;
            };
            let outcome = if persisted.contains(id) {
                EntryOutcome::AlreadyIngested
            } else {
                match forest.entries.get(id) {
                    Some(entry) => self.persist_entry(id, entry),
                    None => EntryOutcome::Failed {
                        stage: EntryStage::Normalize,
                        message: "entry missing from parsed forest".to_string(),
                    },
                }
            };

            match &outcome {
                EntryOutcome::Persisted { blob } => {
                    persisted.insert(id);
                    debug!(
                        entry = %id.short(),
                        location = %hex(&slot.location),
                        ?blob,
                        "entry persisted"
                    );
                }
                EntryOutcome::AlreadyIngested | EntryOutcome::NoPayload => {}
                EntryOutcome::Failed { stage, message } => {
                    warn!(
                        entry = %id.short(),
                        location = %hex(&slot.location),
                        ?stage,
                        error = %message,
                        "entry not persisted"
                    );
                }
            }
            report.entries.push(EntryReport {
                entry: Some(id.clone()),
                location: slot.location,
                type_code: slot.type_code,
                outcome,
            });
        }
        ControlFlow::Continue(())
    }

    /// Normalize, store the raw bytes, then index the record.
    fn persist_entry(&self, id: &ContentId, entry: &ComponentEntry) -> EntryOutcome {
        let record = match entry_record(entry) {
            Ok(record) => record,
            Err(err) => return failed(EntryStage::Normalize, err),
        };
        let blob = match self.blobs.put_if_absent(id, &entry.raw) {
            Ok(blob) => blob,
            Err(err) => return failed(EntryStage::Blob, err),
        };
        if let Err(err) = EntryIndexer::new(self.documents).upsert(&record) {
            return failed(EntryStage::Index, err);
        }
        EntryOutcome::Persisted { blob }
    }
}

fn failed(stage: EntryStage, err: impl fmt::Display) -> EntryOutcome {
    EntryOutcome::Failed { stage, message: err.to_string() }
}

fn cancelled(mut report: PassReport) -> IngestError {
    let state = report.state;
    warn!(%state, "pass cancelled");
    report.state = PassState::Failed;
    IngestError::Cancelled { image: report.image.clone(), state, report: Box::new(report) }
}
