//! Incremental planning: decide per discovered file whether it needs a full
//! parse, a parse of only its appended lines, or nothing at all.
//!
//! The decision compares the file's current line count with the checkpoint
//! stored for its path. Counting reads the whole file; application logs are
//! small and the poll interval is minutes, so this stays cheap in practice.

use serde::Serialize;

use crate::error::Result;
use crate::ingest::reader::count_lines;
use crate::ingest::store::CheckpointStore;
use crate::ingest::LogFileDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScanMode {
    /// No checkpoint yet: parse from line 0 and create one
    FullScan,
    /// Checkpoint behind the file: parse from `start_line` and advance it
    Incremental,
}

/// One planned ingestion action
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub file: LogFileDescriptor,
    pub mode: ScanMode,
    /// Zero-based index of the first line to parse
    pub start_line: u64,
}

/// Result of planning discovered files against stored checkpoints.
#[derive(Debug, Default)]
pub struct WorkPlan {
    /// Files needing work, in discovery order
    pub items: Vec<WorkItem>,
    /// Files whose checkpoint already covers every line
    pub unchanged: Vec<LogFileDescriptor>,
    /// Files that could not be planned this pass (checkpoint lookup or line count failed)
    pub failed: Vec<(LogFileDescriptor, String)>,
}

/// Plan a single file
pub fn plan_file<S>(store: &S, file: &LogFileDescriptor) -> Result<Option<WorkItem>>
where
    S: CheckpointStore + ?Sized,
{
    let path = file.path_key();

    if !store.is_file_known(&path)? {
        return Ok(Some(WorkItem {
            file: file.clone(),
            mode: ScanMode::FullScan,
            start_line: 0,
        }));
    }

    let processed = store.checkpoint_line_count(&path)?;
    let current = count_lines(&file.full_path)?;

    if current > processed {
        Ok(Some(WorkItem {
            file: file.clone(),
            mode: ScanMode::Incremental,
            start_line: processed,
        }))
    } else {
        if current < processed {
            log::warn!(
                "{} has {} lines but {} were already ingested; leaving checkpoint as is",
                path,
                current,
                processed
            );
        }
        Ok(None)
    }
}

/// Plan every discovered file. A file that fails to plan is reported and
/// skipped; it does not stop the others.
pub fn plan_work<S>(store: &S, files: &[LogFileDescriptor]) -> WorkPlan
where
    S: CheckpointStore + ?Sized,
{
    let mut plan = WorkPlan::default();

    for file in files {
        match plan_file(store, file) {
            Ok(Some(item)) => plan.items.push(item),
            Ok(None) => plan.unchanged.push(file.clone()),
            Err(e) => {
                log::warn!("Cannot plan {}: {}", file.full_path.display(), e);
                plan.failed.push((file.clone(), e.to_string()));
            }
        }
    }

    log::debug!(
        "Plan: {} to ingest, {} unchanged, {} failed",
        plan.items.len(),
        plan.unchanged.len(),
        plan.failed.len()
    );
    plan
}
