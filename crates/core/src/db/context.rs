use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tracing::warn;

use crate::blobs::FsBlobStore;
use crate::db::{
    load_detector, open_blob_store, open_document_db, DocumentDb, PassRecord, PassStatus,
    WorkspaceConfig, WorkspaceLayout,
};
use crate::model::ContentId;
use crate::services::backends::AmdfwParser;
use crate::services::detect::RuleScanner;
use crate::services::ingest::{IngestError, Orchestrator, PassDeadline, PassReport};
use crate::services::intake::{register_image, IntakeError, Registration};

/// Convenience wrapper bundling layout, config, and every store a pass needs.
#[derive(Debug)]
pub struct WorkspaceContext {
    pub layout: WorkspaceLayout,
    pub config: WorkspaceConfig,
    pub db_path: PathBuf,
    pub db: DocumentDb,
    pub blobs: FsBlobStore,
    pub detector: RuleScanner,
    pub parser: AmdfwParser,
}

impl WorkspaceContext {
    /// Load workspace config and open the database, blob store and detector for a root.
    pub fn from_root(root: impl AsRef<Path>) -> Result<Self> {
        let layout = WorkspaceLayout::new(root);
        let (config, db_path, db) = open_document_db(&layout)?;
        let blobs = open_blob_store(&layout, &config)?;
        let detector = load_detector(&layout, &config)?;
        Ok(Self { layout, config, db_path, db, blobs, detector, parser: AmdfwParser::new() })
    }

    /// Orchestrator borrowing this workspace's stores.
    pub fn orchestrator(&self) -> Orchestrator<'_> {
        Orchestrator {
            blobs: &self.blobs,
            documents: &self.db,
            detector: &self.detector,
            parser: &self.parser,
        }
    }

    /// Fresh deadline honoring the configured pass timeout.
    pub fn deadline(&self) -> PassDeadline {
        match self.config.pass_timeout_secs {
            Some(secs) => PassDeadline::with_timeout(Duration::from_secs(secs)),
            None => PassDeadline::new(),
        }
    }

    /// Store an image and create its document.
    pub fn register(&self, bytes: &[u8], name: Option<&str>) -> Result<Registration, IntakeError> {
        register_image(&self.blobs, &self.db, bytes, name)
    }

    /// Run one pass and record it in the pass history.
    pub fn analyse(&self, image: &ContentId) -> Result<PassReport, IngestError> {
        self.analyse_with(image, &self.deadline())
    }

    pub fn analyse_with(
        &self,
        image: &ContentId,
        deadline: &PassDeadline,
    ) -> Result<PassReport, IngestError> {
        let started_at = Utc::now().to_rfc3339();
        let result = self.orchestrator().run(image, deadline);
        let finished_at = Utc::now().to_rfc3339();

        let record = match &result {
            Ok(report) => report.to_record(PassStatus::Succeeded, None, started_at, finished_at),
            Err(err) => match err.report() {
                Some(report) => {
                    report.to_record(err.status(), Some(err.to_string()), started_at, finished_at)
                }
                None => PassRecord {
                    image: image.clone(),
                    status: err.status(),
                    signatures: 0,
                    forest_present: false,
                    entries_persisted: 0,
                    entries_failed: 0,
                    error: Some(err.to_string()),
                    started_at,
                    finished_at,
                },
            },
        };
        // Bookkeeping only; a failed insert must not change the pass outcome.
        if let Err(err) = self.db.insert_pass(&record) {
            warn!(image = %image.short(), error = %err, "could not record analysis pass");
        }
        result
    }
}
