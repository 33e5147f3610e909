//! Tab-separated export list parser.
//!
//! The list names one instrument per row and the Archivist instance that
//! holds it:
//!
//! ```text
//! Instrument	Archivist	Notes
//! alspac_91_pq	alspac
//! ncds_81	main
//! ```
//!
//! Columns are found by header name, so extra columns and column order do
//! not matter.

use std::path::Path;

use serde::Serialize;
use url::Url;

use xmlscrub_shared::{Result, ScrubError};

// ---------------------------------------------------------------------------
// Portal
// ---------------------------------------------------------------------------

/// A known Archivist instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Portal {
    Main,
    Alspac,
    Us,
    Wirral,
}

impl Portal {
    /// Map an `Archivist` column value (case-insensitive) to a portal.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "main" => Some(Self::Main),
            "alspac" => Some(Self::Alspac),
            "us" => Some(Self::Us),
            "wirral" => Some(Self::Wirral),
            _ => None,
        }
    }

    /// Root URL of the instance.
    pub fn base_url(self) -> Url {
        let raw = match self {
            Self::Main => "https://archivist.closer.ac.uk/",
            Self::Alspac => "https://closer-archivist-alspac.herokuapp.com/",
            Self::Us => "https://closer-archivist-us.herokuapp.com/",
            Self::Wirral => "https://closer-archivist-wirral.herokuapp.com/",
        };
        Url::parse(raw).expect("static portal URL")
    }

    /// The admin export page listing every instrument's latest export.
    pub fn export_url(self) -> Url {
        self.base_url()
            .join("admin/export")
            .expect("static export path")
    }
}

/// `scheme://host[:port]` of a URL; exports sharing it share one login.
pub fn host_base(url: &Url) -> String {
    url.origin().ascii_serialization()
}

// ---------------------------------------------------------------------------
// ExportTarget
// ---------------------------------------------------------------------------

/// One row of the export list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportTarget {
    /// Instrument prefix, e.g. `alspac_91_pq`.
    pub instrument: String,
    /// Where it is exported from; `None` for an unknown `Archivist` value.
    pub portal: Option<Portal>,
}

impl ExportTarget {
    /// File the fetch stage writes for this instrument.
    pub fn file_name(&self) -> String {
        format!("{}.xml", self.instrument)
    }

    /// Export page to fetch from, if the portal is known.
    pub fn export_url(&self) -> Option<Url> {
        self.portal.map(Portal::export_url)
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

const INSTRUMENT_COLUMN: &str = "Instrument";
const ARCHIVIST_COLUMN: &str = "Archivist";

/// Parse the export list text.
pub fn parse_prefix_list(content: &str) -> Result<Vec<ExportTarget>> {
    let mut lines = content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty());

    let (_, header) = lines
        .next()
        .ok_or_else(|| ScrubError::validation("prefix list is empty"))?;
    let columns: Vec<&str> = header.split('\t').map(str::trim).collect();
    let column = |name: &str| {
        columns.iter().position(|c| *c == name).ok_or_else(|| {
            ScrubError::validation(format!("prefix list has no '{name}' column"))
        })
    };
    let instrument_idx = column(INSTRUMENT_COLUMN)?;
    let archivist_idx = column(ARCHIVIST_COLUMN)?;

    let mut targets = Vec::new();
    for (line_no, line) in lines {
        let cells: Vec<&str> = line.split('\t').map(str::trim).collect();
        let instrument = cells.get(instrument_idx).copied().unwrap_or_default();
        if instrument.is_empty() {
            return Err(ScrubError::validation(format!(
                "prefix list line {}: missing instrument",
                line_no + 1
            )));
        }
        let portal = cells
            .get(archivist_idx)
            .and_then(|label| Portal::from_label(label));
        if portal.is_none() {
            tracing::warn!(instrument, line = line_no + 1, "unknown Archivist instance");
        }
        targets.push(ExportTarget {
            instrument: instrument.to_string(),
            portal,
        });
    }

    Ok(targets)
}

/// Read and parse the export list at `path`.
pub fn load_prefix_list(path: &Path) -> Result<Vec<ExportTarget>> {
    let content = std::fs::read_to_string(path).map_err(|e| ScrubError::io(path, e))?;
    parse_prefix_list(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn portal_labels_case_insensitive() {
        assert_eq!(Portal::from_label("Main"), Some(Portal::Main));
        assert_eq!(Portal::from_label(" ALSPAC "), Some(Portal::Alspac));
        assert_eq!(Portal::from_label("us"), Some(Portal::Us));
        assert_eq!(Portal::from_label("wirral"), Some(Portal::Wirral));
        assert_eq!(Portal::from_label("mars"), None);
    }

    #[test]
    fn export_urls() {
        assert_eq!(
            Portal::Main.export_url().as_str(),
            "https://archivist.closer.ac.uk/admin/export"
        );
        assert_eq!(
            Portal::Wirral.export_url().as_str(),
            "https://closer-archivist-wirral.herokuapp.com/admin/export"
        );
    }

    #[test]
    fn host_base_strips_path() {
        let url = Url::parse("https://example.com/something/somewhere.html").unwrap();
        assert_eq!(host_base(&url), "https://example.com");
        let url = Url::parse("http://localhost:8080/admin/export").unwrap();
        assert_eq!(host_base(&url), "http://localhost:8080");
    }

    #[test]
    fn parses_rows_by_header() {
        let content = "Study\tInstrument\tArchivist\n\
                       ALSPAC\talspac_91_pq\talspac\n\
                       NCDS\tncds_81\tMain\n\
                       \n\
                       X\tlost_one\tnowhere\n";
        let targets = parse_prefix_list(content).unwrap();
        assert_eq!(targets.len(), 3);
        assert_eq!(targets[0].instrument, "alspac_91_pq");
        assert_eq!(targets[0].portal, Some(Portal::Alspac));
        assert_eq!(targets[1].portal, Some(Portal::Main));
        assert_eq!(targets[2].portal, None);
        assert_eq!(targets[0].file_name(), "alspac_91_pq.xml");
        assert!(targets[2].export_url().is_none());
    }

    #[test]
    fn missing_archivist_cell_means_no_portal() {
        let targets = parse_prefix_list("Instrument\tArchivist\nbcs_70\n").unwrap();
        assert_eq!(targets[0].portal, None);
    }

    #[test]
    fn missing_column_rejected() {
        let err = parse_prefix_list("Instrument\tHost\nx\tmain\n").unwrap_err();
        assert!(err.to_string().contains("'Archivist'"));
    }

    #[test]
    fn empty_list_rejected() {
        assert!(parse_prefix_list("\n\n").is_err());
    }

    #[test]
    fn blank_instrument_rejected() {
        let err = parse_prefix_list("Instrument\tArchivist\n\tmain\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
