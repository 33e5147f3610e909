//! Directory repair pipeline: normalize every file, then collapse every file.
//!
//! Each stage is a full pass over the directory. Collapse never starts until
//! every file has been normalized, whatever the worker count.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use xmlscrub_manifest::{DownloadLog, DownloadRecord, load_prefix_list, missing_exports};
use xmlscrub_shared::files;
use xmlscrub_shared::{
    FileChange, FileFailure, RepairOptions, Result, ScrubError, Stage, StageReport,
};

/// Configuration for a `repair_dir` run.
#[derive(Debug, Clone)]
pub struct RepairConfig {
    /// Directory holding the exported files.
    pub dir: PathBuf,
    /// Failure policy and worker count.
    pub options: RepairOptions,
    /// Prefix list to check the directory against before repairing.
    pub manifest: Option<PathBuf>,
    /// Download log that receives one record per failed file.
    pub download_log: Option<PathBuf>,
}

impl RepairConfig {
    /// Repair `dir` with default options and no manifest or log.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            options: RepairOptions::default(),
            manifest: None,
            download_log: None,
        }
    }
}

/// Result of a full repair run.
#[derive(Debug, Clone, Serialize)]
pub struct RepairReport {
    /// The repaired directory.
    pub dir: PathBuf,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// Expected exports that were not in the directory.
    pub missing: Vec<PathBuf>,
    pub normalize: StageReport,
    pub collapse: StageReport,
    /// Total elapsed time.
    pub elapsed: Duration,
}

impl RepairReport {
    /// Every recorded failure, normalize stage first.
    pub fn failures(&self) -> impl Iterator<Item = (Stage, &FileFailure)> {
        self.normalize
            .failures
            .iter()
            .map(|f| (Stage::Normalize, f))
            .chain(self.collapse.failures.iter().map(|f| (Stage::Collapse, f)))
    }

    /// True when no file failed in either stage.
    pub fn is_clean(&self) -> bool {
        self.normalize.is_clean() && self.collapse.is_clean()
    }
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when a stage has listed its files.
    fn stage_started(&self, stage: Stage, files: usize);
    /// Called as each file's outcome is recorded, in file order.
    fn file_done(&self, stage: Stage, path: &Path, current: usize, total: usize);
    /// Called when a stage has processed every file.
    fn stage_finished(&self, report: &StageReport);
    /// Called when a full repair run completes.
    fn done(&self, report: &RepairReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn stage_started(&self, _stage: Stage, _files: usize) {}
    fn file_done(&self, _stage: Stage, _path: &Path, _current: usize, _total: usize) {}
    fn stage_finished(&self, _report: &StageReport) {}
    fn done(&self, _report: &RepairReport) {}
}

/// Run both stages over `config.dir`.
///
/// 1. Manifest check (if a prefix list is given): warn about missing files
/// 2. Normalize every file
/// 3. Collapse every file
///
/// Under the abort policy the first failing file ends the run with
/// [`ScrubError::Aborted`]; later stages do not run.
#[instrument(skip_all, fields(dir = %config.dir.display()))]
pub async fn repair_dir(
    config: &RepairConfig,
    progress: &dyn ProgressReporter,
) -> Result<RepairReport> {
    config.options.validate()?;
    let started_at = Utc::now();
    let start = Instant::now();

    info!(
        policy = ?config.options.failure_policy,
        jobs = config.options.jobs,
        "starting repair"
    );

    let missing = match &config.manifest {
        Some(prefix_list) => {
            let targets = load_prefix_list(prefix_list)?;
            missing_exports(&targets, &config.dir)?
        }
        None => Vec::new(),
    };

    let log = config.download_log.as_ref().map(DownloadLog::new);

    let normalize = run_logged(
        &config.dir,
        Stage::Normalize,
        config.options,
        progress,
        log.as_ref(),
    )
    .await?;
    let collapse = run_logged(
        &config.dir,
        Stage::Collapse,
        config.options,
        progress,
        log.as_ref(),
    )
    .await?;

    let report = RepairReport {
        dir: config.dir.clone(),
        started_at,
        missing,
        normalize,
        collapse,
        elapsed: start.elapsed(),
    };

    info!(
        normalize_failed = report.normalize.failures.len(),
        collapse_failed = report.collapse.failures.len(),
        missing = report.missing.len(),
        elapsed_ms = report.elapsed.as_millis(),
        "repair completed"
    );
    progress.done(&report);
    Ok(report)
}

/// Run one stage over every regular file in `dir`.
///
/// Files start in sorted order. With `jobs > 1` up to `jobs` files are in
/// flight on blocking worker threads; outcomes are still recorded in file
/// order. Under the abort policy no new file starts once a failure is
/// recorded, and files already in flight are allowed to finish.
#[instrument(skip_all, fields(dir = %dir.display(), %stage))]
pub async fn run_stage(
    dir: &Path,
    stage: Stage,
    options: RepairOptions,
    progress: &dyn ProgressReporter,
) -> Result<StageReport> {
    options.validate()?;
    let start = Instant::now();
    let paths = files::list_files(dir)?;
    let total = paths.len();
    info!(files = total, jobs = options.jobs, "starting stage");
    progress.stage_started(stage, total);

    let work = stage_fn(stage);
    let mut report = StageReport::new(stage);
    let mut in_flight: VecDeque<(PathBuf, JoinHandle<Result<FileChange>>)> = VecDeque::new();
    let mut current = 0;

    for path in paths {
        if in_flight.len() == options.jobs {
            if let Some((done_path, handle)) = in_flight.pop_front() {
                current += 1;
                let outcome = join_outcome(handle).await;
                progress.file_done(stage, &done_path, current, total);
                if let Err(e) = report.record(&done_path, outcome, options.failure_policy) {
                    drain(in_flight).await;
                    return Err(e);
                }
            }
        }

        let task_path = path.clone();
        let handle = tokio::task::spawn_blocking(move || work(&task_path));
        in_flight.push_back((path, handle));
    }

    while let Some((done_path, handle)) = in_flight.pop_front() {
        current += 1;
        let outcome = join_outcome(handle).await;
        progress.file_done(stage, &done_path, current, total);
        if let Err(e) = report.record(&done_path, outcome, options.failure_policy) {
            drain(in_flight).await;
            return Err(e);
        }
    }

    report.elapsed = start.elapsed();
    info!(
        rewritten = report.rewritten,
        unchanged = report.unchanged,
        failed = report.failures.len(),
        elapsed_ms = report.elapsed.as_millis(),
        "stage completed"
    );
    progress.stage_finished(&report);
    Ok(report)
}

/// Run only the entity normalizer over every regular file in `dir`.
pub async fn normalize_dir(
    dir: &Path,
    options: RepairOptions,
    progress: &dyn ProgressReporter,
) -> Result<StageReport> {
    run_stage(dir, Stage::Normalize, options, progress).await
}

/// Run only the XML whitespace collapser over every regular file in `dir`.
pub async fn collapse_dir(
    dir: &Path,
    options: RepairOptions,
    progress: &dyn ProgressReporter,
) -> Result<StageReport> {
    run_stage(dir, Stage::Collapse, options, progress).await
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn stage_fn(stage: Stage) -> fn(&Path) -> Result<FileChange> {
    match stage {
        Stage::Normalize => xmlscrub_entities::normalize_file,
        Stage::Collapse => xmlscrub_xml::collapse_file,
    }
}

async fn join_outcome(handle: JoinHandle<Result<FileChange>>) -> Result<FileChange> {
    handle
        .await
        .unwrap_or_else(|e| Err(ScrubError::task(e.to_string())))
}

/// Wait for files still in flight so nothing is written after we return.
async fn drain(in_flight: VecDeque<(PathBuf, JoinHandle<Result<FileChange>>)>) {
    for (path, handle) in in_flight {
        if let Err(e) = join_outcome(handle).await {
            warn!(path = %path.display(), error = %e, "in-flight file failed after abort");
        }
    }
}

/// Run a stage and append its failures to the download log, if any.
async fn run_logged(
    dir: &Path,
    stage: Stage,
    options: RepairOptions,
    progress: &dyn ProgressReporter,
    log: Option<&DownloadLog>,
) -> Result<StageReport> {
    let result = run_stage(dir, stage, options, progress).await;

    if let Some(log) = log {
        let records: Vec<DownloadRecord> = match &result {
            Ok(report) => report
                .failures
                .iter()
                .map(|f| failure_record(stage, &f.path, &f.message))
                .collect(),
            Err(ScrubError::Aborted { path, source, .. }) => {
                vec![failure_record(stage, path, &source.to_string())]
            }
            Err(_) => Vec::new(),
        };
        if let Err(e) = log.append(&records) {
            warn!(
                log = %log.path().display(),
                error = %e,
                "could not record failures in download log"
            );
        }
    }

    result
}

fn failure_record(stage: Stage, path: &Path, message: &str) -> DownloadRecord {
    let unit = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    DownloadRecord::new(unit, format!("{stage}-failed"), message)
}
