//! Core domain types shared by the repair stages.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, ScrubError};

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// One directory-wide pass of the repair pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Entity un-escaping and terminator repair on raw text.
    Normalize,
    /// XML parse, line-break collapsing, and re-serialization.
    Collapse,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normalize => f.write_str("normalize"),
            Self::Collapse => f.write_str("collapse"),
        }
    }
}

// ---------------------------------------------------------------------------
// FailurePolicy
// ---------------------------------------------------------------------------

/// What a stage does when a single file fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop the whole run at the first failing file.
    #[default]
    Abort,
    /// Record the failure and move on to the next file.
    Continue,
}

impl std::str::FromStr for FailurePolicy {
    type Err = ScrubError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "continue" => Ok(Self::Continue),
            other => Err(ScrubError::validation(format!(
                "unknown failure policy '{other}': expected 'abort' or 'continue'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Per-file outcomes
// ---------------------------------------------------------------------------

/// Result of running one stage on one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileChange {
    /// New content was written over the file.
    Rewritten,
    /// The stage produced identical bytes; the file was left alone.
    Unchanged,
}

/// A file that failed under [`FailurePolicy::Continue`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileFailure {
    /// The failing file.
    pub path: PathBuf,
    /// Rendered error.
    pub message: String,
}

// ---------------------------------------------------------------------------
// StageReport
// ---------------------------------------------------------------------------

/// Summary of one stage over one directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageReport {
    /// Which stage produced this report.
    pub stage: Stage,
    /// Files rewritten in place.
    pub rewritten: usize,
    /// Files that came out byte-identical.
    pub unchanged: usize,
    /// Files that failed (only populated under [`FailurePolicy::Continue`]).
    pub failures: Vec<FileFailure>,
    /// Wall-clock time spent in the stage.
    pub elapsed: Duration,
}

impl StageReport {
    /// Empty report for `stage`.
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            rewritten: 0,
            unchanged: 0,
            failures: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    /// Number of files the stage attempted.
    pub fn files_seen(&self) -> usize {
        self.rewritten + self.unchanged + self.failures.len()
    }

    /// True when no file failed.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Fold one file's result into the report.
    ///
    /// Under [`FailurePolicy::Abort`] a failure is returned as
    /// [`ScrubError::Aborted`]; under [`FailurePolicy::Continue`] it is
    /// recorded and `Ok(())` is returned.
    pub fn record(
        &mut self,
        path: &Path,
        outcome: Result<FileChange>,
        policy: FailurePolicy,
    ) -> Result<()> {
        match outcome {
            Ok(FileChange::Rewritten) => self.rewritten += 1,
            Ok(FileChange::Unchanged) => self.unchanged += 1,
            Err(e) => match policy {
                FailurePolicy::Abort => return Err(ScrubError::aborted(self.stage, path, e)),
                FailurePolicy::Continue => {
                    warn!(
                        stage = %self.stage,
                        path = %path.display(),
                        error = %e,
                        "file failed, continuing"
                    );
                    self.failures.push(FileFailure {
                        path: path.to_path_buf(),
                        message: e.to_string(),
                    });
                }
            },
        }
        Ok(())
    }
}
