//! Export manifest: which instruments belong in the export directory, where
//! each one is fetched from, and the download log the fetch stage keeps.
//!
//! The repair stages only consume this. Nothing here talks to the network.

mod download_log;
mod prefix_list;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument, warn};

use xmlscrub_shared::files;
use xmlscrub_shared::Result;

pub use download_log::{DownloadLog, DownloadRecord};
pub use prefix_list::{ExportTarget, Portal, host_base, load_prefix_list, parse_prefix_list};

/// Group targets by `scheme://host` so each instance is logged into once.
///
/// Targets without a known portal are left out.
pub fn group_by_host(targets: &[ExportTarget]) -> BTreeMap<String, Vec<&ExportTarget>> {
    let mut groups: BTreeMap<String, Vec<&ExportTarget>> = BTreeMap::new();
    for target in targets {
        if let Some(url) = target.export_url() {
            groups.entry(host_base(&url)).or_default().push(target);
        }
    }
    groups
}

/// Expected export files that are not present in `dir`.
#[instrument(skip_all, fields(dir = %dir.display(), expected = targets.len()))]
pub fn missing_exports(targets: &[ExportTarget], dir: &Path) -> Result<Vec<PathBuf>> {
    let present = files::list_files(dir)?;
    let missing: Vec<PathBuf> = targets
        .iter()
        .map(|t| dir.join(t.file_name()))
        .filter(|expected| !present.contains(expected))
        .collect();

    for path in &missing {
        warn!(path = %path.display(), "expected export is missing");
    }
    debug!(missing = missing.len(), "manifest check done");
    Ok(missing)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(instrument: &str, portal: Option<Portal>) -> ExportTarget {
        ExportTarget {
            instrument: instrument.into(),
            portal,
        }
    }

    #[test]
    fn groups_by_unique_host() {
        let targets = vec![
            target("a", Some(Portal::Main)),
            target("b", Some(Portal::Alspac)),
            target("c", Some(Portal::Main)),
            target("d", None),
        ];

        let groups = group_by_host(&targets);

        assert_eq!(groups.len(), 2);
        let main: Vec<_> = groups["https://archivist.closer.ac.uk"]
            .iter()
            .map(|t| t.instrument.as_str())
            .collect();
        assert_eq!(main, vec!["a", "c"]);
        assert_eq!(groups["https://closer-archivist-alspac.herokuapp.com"].len(), 1);
    }

    #[test]
    fn reports_missing_exports() {
        let dir = std::env::temp_dir().join(format!("xs-manifest-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("ncds_81.xml"), "<a/>").unwrap();

        let targets = vec![target("ncds_81", Some(Portal::Main)), target("bcs_70", None)];
        let missing = missing_exports(&targets, &dir).unwrap();

        assert_eq!(missing, vec![dir.join("bcs_70.xml")]);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_dir_is_an_error() {
        let dir = std::env::temp_dir().join(format!("xs-manifest-{}", uuid::Uuid::now_v7()));
        assert!(missing_exports(&[], &dir).is_err());
    }
}
