use std::fs;
use std::io::{self, BufRead, BufReader};

use amdfw_core::db::WorkspaceContext;
use amdfw_core::model::{ContentId, FirmwareImage};
use amdfw_core::services::ingest::{IngestError, PassReport};
use anyhow::{bail, Context, Result};
use serde::Serialize;
use tracing::{error, warn};

use crate::commands::{open_workspace, parse_content_id};

/// Result of one pass as printed by `analyse --json`.
#[derive(Debug, Serialize)]
pub struct PassOutcome {
    pub image: ContentId,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<PassReport>,
}

impl PassOutcome {
    fn from_result(image: &ContentId, result: Result<PassReport, IngestError>) -> Self {
        match result {
            Ok(report) => {
                Self { image: image.clone(), ok: true, error: None, report: Some(report) }
            }
            Err(err) => Self {
                image: image.clone(),
                ok: false,
                error: Some(err.to_string()),
                report: err.report().cloned(),
            },
        }
    }
}

/// Totals for a batch of consumed work items.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ConsumeSummary {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Lines that were not a valid work item.
    pub rejected: usize,
}

fn print_outcome(outcome: &PassOutcome) {
    let short = outcome.image.short();
    match (&outcome.report, &outcome.error) {
        (Some(report), None) => println!(
            "Pass on {short}: {} (signatures: {}, entries persisted: {}, failed: {}, \
             new blobs: {}, parent updated: {})",
            report.state,
            report.signatures.len(),
            report.persisted(),
            report.failed(),
            report.blobs_stored(),
            if report.parent_updated { "yes" } else { "no" },
        ),
        (_, Some(err)) => println!("Pass on {short}: FAILED ({err})"),
        (None, None) => println!("Pass on {short}: no report"),
    }
}

fn run_pass(ctx: &WorkspaceContext, image: &ContentId) -> PassOutcome {
    let result = ctx.analyse(image);
    if let Err(err) = &result {
        error!(image = %image.short(), error = %err, "analysis pass failed");
    }
    PassOutcome::from_result(image, result)
}

/// Run one analysis pass per image id. Fails if any pass failed.
pub fn analyse_command(root: &str, ids: &[String], json: bool) -> Result<()> {
    let ctx = open_workspace(root)?;
    let images = ids.iter().map(|id| parse_content_id(id)).collect::<Result<Vec<_>>>()?;

    let outcomes: Vec<PassOutcome> = images.iter().map(|image| run_pass(&ctx, image)).collect();
    if json {
        println!("{}", serde_json::to_string_pretty(&outcomes)?);
    } else {
        outcomes.iter().for_each(print_outcome);
    }

    let failed = outcomes.iter().filter(|o| !o.ok).count();
    if failed > 0 {
        bail!("{} of {} analysis passes failed", failed, outcomes.len());
    }
    Ok(())
}

/// Process JSON-lines work items (`{"ID": "<image id>"}`) from `reader`.
///
/// Blank lines are skipped; malformed lines are logged and counted as rejected.
pub fn consume_work_items<R: BufRead>(
    ctx: &WorkspaceContext,
    reader: R,
) -> Result<ConsumeSummary> {
    let mut summary = ConsumeSummary::default();
    for (index, line) in reader.lines().enumerate() {
        let line = line.context("Failed to read work item")?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let item: FirmwareImage = match serde_json::from_str(trimmed) {
            Ok(item) => item,
            Err(err) => {
                warn!(line = index + 1, error = %err, "rejected malformed work item");
                println!("Line {}: rejected ({err})", index + 1);
                summary.rejected += 1;
                continue;
            }
        };

        let outcome = run_pass(ctx, &item.id);
        print_outcome(&outcome);
        summary.processed += 1;
        if outcome.ok {
            summary.succeeded += 1;
        } else {
            summary.failed += 1;
        }
    }
    Ok(summary)
}

/// Consume work items from `file`, or stdin when absent.
pub fn consume_command(root: &str, file: Option<&str>) -> Result<()> {
    let ctx = open_workspace(root)?;
    let summary = match file {
        Some(path) => {
            let handle =
                fs::File::open(path).with_context(|| format!("Failed to open work items {path}"))?;
            consume_work_items(&ctx, BufReader::new(handle))?
        }
        None => consume_work_items(&ctx, io::stdin().lock())?,
    };

    println!(
        "Consumed {} work items: {} succeeded, {} failed, {} rejected",
        summary.processed + summary.rejected,
        summary.succeeded,
        summary.failed,
        summary.rejected
    );
    if summary.failed > 0 || summary.rejected > 0 {
        bail!("{} work items did not complete", summary.failed + summary.rejected);
    }
    Ok(())
}

/// List recorded analysis passes, optionally for one image.
pub fn list_passes_command(root: &str, image: Option<&str>, json: bool) -> Result<()> {
    let ctx = open_workspace(root)?;
    let filter = image.map(parse_content_id).transpose()?;
    let passes = ctx.db.list_passes(filter.as_ref()).context("Failed to list passes")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&passes)?);
        return Ok(());
    }

    println!("Passes:");
    if passes.is_empty() {
        println!("(none)");
        return Ok(());
    }
    for pass in passes {
        print!(
            "- {} [{}] {} -> {} signatures: {}, persisted: {}, failed: {}",
            pass.image.short(),
            pass.status.as_str(),
            pass.started_at,
            pass.finished_at,
            pass.signatures,
            pass.entries_persisted,
            pass.entries_failed
        );
        match pass.error {
            Some(err) => println!(" error: {err}"),
            None => println!(),
        }
    }
    Ok(())
}
