//! Entity repair for raw Archivist exports.
//!
//! Exports come out of the portal with ampersands escaped one or two times
//! too many and with numeric character references terminated by `:` or not
//! at all. This crate rewrites those byte sequences so the file can be parsed
//! as XML. Every other byte, including invalid UTF-8 and line endings, is
//! copied through unchanged.

pub mod rules;

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::{debug, instrument};

use xmlscrub_shared::files;
use xmlscrub_shared::{FileChange, Result, ScrubError};

pub use rules::{CompiledRule, ENTITY_RULES, Matcher, SubstitutionRule, compiled_rules};

/// Run every rule over an in-memory buffer, one full pass per rule.
pub fn normalize_bytes(input: &[u8]) -> Vec<u8> {
    let mut current = input.to_vec();
    for rule in compiled_rules() {
        let mut next = Vec::with_capacity(current.len());
        for line in current.split_inclusive(|&b| b == b'\n') {
            next.extend_from_slice(&rule.apply(line).0);
        }
        current = next;
    }
    current
}

/// Repair one file in place.
///
/// Each rule is a separate pass from the previous pass's scratch file into a
/// new one; the last scratch file replaces the original only after all passes
/// succeed. Returns [`FileChange::Unchanged`] without touching the file when
/// no rule matched.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn normalize_file(path: &Path) -> Result<FileChange> {
    let mut previous: Option<NamedTempFile> = None;
    let mut total_hits = 0;

    for (pass, rule) in compiled_rules().iter().enumerate() {
        let source = match &previous {
            Some(scratch) => scratch.reopen().map_err(|e| ScrubError::io(scratch.path(), e))?,
            None => File::open(path).map_err(|e| ScrubError::io(path, e))?,
        };

        let mut next = files::scratch_file(path)?;
        let hits = {
            let mut writer = BufWriter::new(next.as_file_mut());
            rule.apply_stream(BufReader::new(source), &mut writer)
                .and_then(|hits| writer.flush().map(|()| hits))
                .map_err(|e| ScrubError::io(path, e))?
        };

        debug!(pass = pass + 1, rule = rule.rule().name, hits, "pass complete");
        total_hits += hits;
        previous = Some(next);
    }

    let Some(result) = previous else {
        return Ok(FileChange::Unchanged);
    };

    if total_hits == 0 {
        debug!("no entity defects found");
        return Ok(FileChange::Unchanged);
    }

    files::persist_over(result, path)?;
    debug!(replacements = total_hits, "file rewritten");
    Ok(FileChange::Rewritten)
}
