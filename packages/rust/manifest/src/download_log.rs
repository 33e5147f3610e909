//! Append-only download log.
//!
//! One `unit,label,location` record per line, e.g.
//! `alspac_91_pq,2024-03-01,export_xml/archivist_xml/alspac_91_pq.xml`.
//! The fetch stage writes a record per downloaded instrument; the repair
//! stages add `<stem>,<stage>-failed,<diagnostic>` records for files they
//! could not repair.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use xmlscrub_shared::{Result, ScrubError};

/// One line of the download log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadRecord {
    /// Instrument prefix or file stem.
    pub unit: String,
    /// Date of the export, or a status such as `collapse-failed`.
    pub label: String,
    /// Saved file path, or a diagnostic. May be empty.
    pub location: String,
}

impl DownloadRecord {
    pub fn new(
        unit: impl Into<String>,
        label: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            unit: unit.into(),
            label: label.into(),
            location: location.into(),
        }
    }

    /// Render as a single log line (no trailing newline).
    ///
    /// Commas in `unit` and `label` would shift the columns, so they become
    /// `;`. Line breaks anywhere become spaces. `location` is the last
    /// column and may keep its commas.
    pub fn to_line(&self) -> String {
        format!(
            "{},{},{}",
            flatten(&self.unit).replace(',', ";"),
            flatten(&self.label).replace(',', ";"),
            flatten(&self.location)
        )
    }

    /// Parse a log line. Two-field lines (no location) are accepted.
    pub fn parse_line(line: &str) -> Option<Self> {
        let mut parts = line.splitn(3, ',');
        let unit = parts.next()?.trim();
        let label = parts.next()?.trim();
        if unit.is_empty() {
            return None;
        }
        let location = parts.next().unwrap_or_default().trim();
        Some(Self::new(unit, label, location))
    }
}

fn flatten(field: &str) -> String {
    field.replace("\r\n", " ").replace(['\r', '\n'], " ")
}

/// Handle on a download log file.
#[derive(Debug, Clone)]
pub struct DownloadLog {
    path: PathBuf,
}

impl DownloadLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append records, creating the file (not its directory) if needed.
    pub fn append(&self, records: &[DownloadRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| ScrubError::io(&self.path, e))?;

        let mut buf = String::new();
        for record in records {
            buf.push_str(&record.to_line());
            buf.push('\n');
        }
        file.write_all(buf.as_bytes())
            .map_err(|e| ScrubError::io(&self.path, e))?;

        debug!(path = %self.path.display(), records = records.len(), "appended to download log");
        Ok(())
    }

    /// Read every record. A missing log reads as empty; malformed lines are
    /// skipped.
    pub fn read_all(&self) -> Result<Vec<DownloadRecord>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ScrubError::io(&self.path, e)),
        };
        Ok(content.lines().filter_map(DownloadRecord::parse_line).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_log() -> (PathBuf, DownloadLog) {
        let dir = std::env::temp_dir().join(format!("xs-log-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        let log = DownloadLog::new(dir.join("download_list.csv"));
        (dir, log)
    }

    #[test]
    fn append_then_read_back() {
        let (dir, log) = temp_log();
        log.append(&[DownloadRecord::new("ncds_81", "2024-03-01", "out/ncds_81.xml")])
            .unwrap();
        log.append(&[DownloadRecord::new("bcs_70", "skipped", "")]).unwrap();

        let records = log.read_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].location, "out/ncds_81.xml");
        assert_eq!(records[1].label, "skipped");
        assert_eq!(records[1].location, "");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_log_reads_empty() {
        let (dir, log) = temp_log();
        assert!(log.read_all().unwrap().is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn diagnostics_keep_commas_but_not_newlines() {
        let record = DownloadRecord::new(
            "us_ncds",
            "collapse-failed",
            "XML parse error at byte 40: expected `;`, found `:`\nat line 2",
        );
        let line = record.to_line();
        assert!(!line.contains('\n'));

        let back = DownloadRecord::parse_line(&line).unwrap();
        assert_eq!(back.unit, "us_ncds");
        assert_eq!(back.label, "collapse-failed");
        assert!(back.location.contains("found `:` at line 2"));
    }

    #[test]
    fn commas_in_unit_do_not_shift_columns() {
        let line = DownloadRecord::new("a,b", "2024-01-01", "x").to_line();
        assert_eq!(line, "a;b,2024-01-01,x");
    }

    #[test]
    fn rejects_lines_without_label() {
        assert!(DownloadRecord::parse_line("lonely").is_none());
        assert!(DownloadRecord::parse_line(",label,loc").is_none());
    }
}
