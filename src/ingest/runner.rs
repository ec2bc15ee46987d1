//! Ingestion runner: discovery → planning → bounded read + parse → commit.
//!
//! Two entry points share one runner:
//! - [`IngestionRunner::run_full_scan`] picks up files never seen before and
//!   skips every known file, grown or not.
//! - [`IngestionRunner::run_incremental_scan`] routes every file through the
//!   planner and also tops up files that grew since their checkpoint.
//!
//! A failure on one file is logged and recorded in the report; the file's
//! checkpoint does not move, so the next pass retries the same line range.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

use crate::error::Result;
use crate::ingest::incremental::{plan_work, ScanMode};
use crate::ingest::parser::{parse_line, SessionRecord};
use crate::ingest::reader::for_each_line_from;
use crate::ingest::store::CheckpointStore;
use crate::ingest::walker::{list_subdirectories, scan_directory, LogFileDescriptor, SubdirectoryDescriptor};

/// A directory to scan, with a label for reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanRoot {
    pub path: PathBuf,
    pub label: String,
}

impl ScanRoot {
    pub fn new(path: impl AsRef<Path>, label: impl Into<String>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            label: label.into(),
        }
    }
}

/// What happened to one file during a pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    /// First sighting: parsed from line 0, checkpoint created
    Ingested { records: usize, lines: u64 },
    /// Grown since its checkpoint: appended lines parsed, checkpoint advanced
    Appended { records: usize, from_line: u64, to_line: u64 },
    /// Full scan skipped a file that already has a checkpoint
    AlreadyProcessed,
    /// Checkpoint already covers the whole file
    Unchanged,
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub root_label: String,
    pub file: LogFileDescriptor,
    pub outcome: FileOutcome,
}

/// Discovery results for one root
#[derive(Debug, Clone, Serialize)]
pub struct RootSummary {
    pub label: String,
    pub path: PathBuf,
    pub subdirectories: Vec<SubdirectoryDescriptor>,
    pub files_found: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    pub roots: Vec<RootSummary>,
    /// Newest file first
    pub files: Vec<FileReport>,
}

impl ScanReport {
    pub fn records_inserted(&self) -> usize {
        self.files
            .iter()
            .map(|f| match f.outcome {
                FileOutcome::Ingested { records, .. } | FileOutcome::Appended { records, .. } => records,
                _ => 0,
            })
            .sum()
    }

    pub fn files_ingested(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Ingested { .. }))
    }

    pub fn files_appended(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Appended { .. }))
    }

    pub fn files_skipped(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::AlreadyProcessed | FileOutcome::Unchanged))
    }

    pub fn files_failed(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&FileOutcome) -> bool) -> usize {
        self.files.iter().filter(|f| pred(&f.outcome)).count()
    }

    fn push(&mut self, root_label: &str, file: LogFileDescriptor, outcome: FileOutcome) {
        self.files.push(FileReport {
            root_label: root_label.to_string(),
            file,
            outcome,
        });
    }

    fn finish(mut self) -> Self {
        self.files.sort_by(|a, b| b.file.last_modified.cmp(&a.file.last_modified));
        self
    }
}

/// Sessions parsed from a line range, plus the file's line total at read time
#[derive(Debug, Default)]
pub struct ParsedRange {
    pub records: Vec<SessionRecord>,
    pub total_lines: u64,
}

/// Parse every line of `path` at or after zero-based `start_line`
pub fn parse_file_from(path: &Path, start_line: u64) -> Result<ParsedRange> {
    let mut records = Vec::new();
    let total_lines = for_each_line_from(path, start_line, |line| {
        if let Some(record) = parse_line(line) {
            records.push(record);
        }
    })?;
    Ok(ParsedRange { records, total_lines })
}

/// Drives scans against a checkpoint store. Passes on the same runner never
/// overlap: full scans wait their turn, poll ticks are dropped when busy.
pub struct IngestionRunner<S> {
    store: S,
    scan_lock: Mutex<()>,
}

impl<S: CheckpointStore> IngestionRunner<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            scan_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.scan_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ingest every file that has no checkpoint yet. Known files are skipped.
    pub fn run_full_scan(&self, roots: &[ScanRoot]) -> ScanReport {
        let _guard = self.lock();
        let (mut report, files) = discover(roots);
        log::info!("Full scan: {} log files across {} roots", files.len(), roots.len());

        for (label, file) in files {
            let outcome = match self.store.is_file_known(&file.path_key()) {
                Ok(true) => FileOutcome::AlreadyProcessed,
                Ok(false) => self.ingest_new(&file),
                Err(e) => FileOutcome::Failed { error: e.to_string() },
            };
            log_outcome(&file, &outcome);
            report.push(&label, file, outcome);
        }

        let report = report.finish();
        log_summary("Full scan", &report);
        report
    }

    /// Ingest new files and the appended tail of grown files.
    pub fn run_incremental_scan(&self, roots: &[ScanRoot]) -> ScanReport {
        let _guard = self.lock();
        self.incremental_pass(roots)
    }

    /// Like [`Self::run_incremental_scan`], but returns `None` immediately if
    /// another pass is still running.
    pub fn try_run_incremental_scan(&self, roots: &[ScanRoot]) -> Option<ScanReport> {
        let _guard = match self.scan_lock.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                log::debug!("Previous scan still running; skipping this tick");
                return None;
            }
        };
        Some(self.incremental_pass(roots))
    }

    fn incremental_pass(&self, roots: &[ScanRoot]) -> ScanReport {
        let (mut report, files) = discover(roots);
        let labels: HashMap<PathBuf, String> = files
            .iter()
            .map(|(label, f)| (f.full_path.clone(), label.clone()))
            .collect();
        let label_of = |file: &LogFileDescriptor| labels.get(&file.full_path).cloned().unwrap_or_default();
        let descriptors: Vec<LogFileDescriptor> = files.into_iter().map(|(_, f)| f).collect();

        let plan = plan_work(&self.store, &descriptors);

        for item in plan.items {
            let outcome = match item.mode {
                ScanMode::FullScan => self.ingest_new(&item.file),
                ScanMode::Incremental => self.ingest_growth(&item.file, item.start_line),
            };
            log_outcome(&item.file, &outcome);
            report.push(&label_of(&item.file), item.file, outcome);
        }
        for file in plan.unchanged {
            report.push(&label_of(&file), file, FileOutcome::Unchanged);
        }
        for (file, error) in plan.failed {
            report.push(&label_of(&file), file, FileOutcome::Failed { error });
        }

        let report = report.finish();
        log_summary("Incremental scan", &report);
        report
    }

    fn ingest_new(&self, file: &LogFileDescriptor) -> FileOutcome {
        let result = parse_file_from(&file.full_path, 0).and_then(|parsed| {
            self.store
                .commit_new_file(&file.file_name, &file.path_key(), parsed.total_lines, &parsed.records)
                .map(|_| FileOutcome::Ingested {
                    records: parsed.records.len(),
                    lines: parsed.total_lines,
                })
        });
        result.unwrap_or_else(|e| FileOutcome::Failed { error: e.to_string() })
    }

    fn ingest_growth(&self, file: &LogFileDescriptor, start_line: u64) -> FileOutcome {
        let parsed = match parse_file_from(&file.full_path, start_line) {
            Ok(parsed) => parsed,
            Err(e) => return FileOutcome::Failed { error: e.to_string() },
        };

        // Truncated or replaced between planning and reading
        if parsed.total_lines <= start_line {
            return FileOutcome::Unchanged;
        }

        match self
            .store
            .commit_growth(&file.path_key(), start_line, parsed.total_lines, &parsed.records)
        {
            Ok(()) => FileOutcome::Appended {
                records: parsed.records.len(),
                from_line: start_line,
                to_line: parsed.total_lines,
            },
            Err(e) => FileOutcome::Failed { error: e.to_string() },
        }
    }
}

/// Walk every root once. Files reachable from more than one root are kept
/// under the first root that found them.
fn discover(roots: &[ScanRoot]) -> (ScanReport, Vec<(String, LogFileDescriptor)>) {
    let mut report = ScanReport::default();
    let mut seen = HashSet::new();
    let mut files = Vec::new();

    for root in roots {
        if !root.path.is_dir() {
            log::warn!("[{}] {} does not exist; nothing to scan", root.label, root.path.display());
        }

        let subdirectories = list_subdirectories(&root.path);
        let found = scan_directory(&root.path);
        report.roots.push(RootSummary {
            label: root.label.clone(),
            path: root.path.clone(),
            subdirectories,
            files_found: found.len(),
        });

        for file in found {
            if seen.insert(file.full_path.clone()) {
                files.push((root.label.clone(), file));
            }
        }
    }

    (report, files)
}

fn log_outcome(file: &LogFileDescriptor, outcome: &FileOutcome) {
    match outcome {
        FileOutcome::Ingested { records, lines } => {
            log::info!("✓ {} ({} sessions from {} lines)", file.file_name, records, lines)
        }
        FileOutcome::Appended { records, from_line, to_line } => log::info!(
            "✓ {} (+{} sessions, lines {}..{})",
            file.file_name,
            records,
            from_line + 1,
            to_line
        ),
        FileOutcome::AlreadyProcessed => log::debug!("Already processed: {}", file.file_name),
        FileOutcome::Unchanged => log::debug!("Unchanged: {}", file.file_name),
        FileOutcome::Failed { error } => log::error!("✗ {}: {}", file.full_path.display(), error),
    }
}

fn log_summary(kind: &str, report: &ScanReport) {
    log::info!(
        "{} complete: {} files, {} new, {} grown, {} skipped, {} failed, {} sessions stored",
        kind,
        report.files.len(),
        report.files_ingested(),
        report.files_appended(),
        report.files_skipped(),
        report.files_failed(),
        report.records_inserted()
    );
    if report.files_failed() > 0 {
        log::warn!("Some files failed to ingest; they will be retried on the next scan");
    }
}
