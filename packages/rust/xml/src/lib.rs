//! XML whitespace collapsing for repaired exports.
//!
//! Each file is parsed into an [`XmlDocument`] with entities resolved, line
//! breaks inside text are collapsed to single spaces, and the tree is written
//! back as UTF-8 with an XML declaration. The file must already be
//! well-formed, so this stage runs after entity repair.

mod collapse;
mod document;
mod dtd;
mod serialize;

use std::path::Path;

use tracing::{debug, instrument};

use xmlscrub_shared::files;
use xmlscrub_shared::{FileChange, Result, ScrubError};

pub use collapse::{collapse_line_breaks, needs_collapse};
pub use document::{Element, Misc, Node, XmlDocument};
pub use serialize::XML_DECLARATION;

/// Parse, collapse, and re-serialize a document held in memory.
pub fn collapse_str(input: &str) -> Result<String> {
    let mut doc = XmlDocument::parse(input)?;
    let segments = doc.collapse_line_breaks();
    debug!(segments, "collapsed text segments");
    Ok(doc.to_xml_string())
}

/// Collapse one file in place.
///
/// A parse failure leaves the file untouched. Returns
/// [`FileChange::Unchanged`] when serialization reproduces the input bytes.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn collapse_file(path: &Path) -> Result<FileChange> {
    let raw = std::fs::read(path).map_err(|e| ScrubError::io(path, e))?;
    let text = std::str::from_utf8(&raw).map_err(|e| {
        ScrubError::parse(e.valid_up_to() as u64, "file is not valid UTF-8")
    })?;

    let output = collapse_str(text)?;
    if output.as_bytes() == raw.as_slice() {
        return Ok(FileChange::Unchanged);
    }

    files::replace_file(path, output.as_bytes())?;
    debug!(bytes_in = raw.len(), bytes_out = output.len(), "file rewritten");
    Ok(FileChange::Rewritten)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("xs-xml-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn collapse_str_resolves_and_collapses() {
        let out = collapse_str(
            "<r:Content>City &amp; Guilds &#160;intermediate\r\ntechnical</r:Content>",
        )
        .unwrap();
        assert_eq!(
            out,
            "<?xml version='1.0' encoding='UTF-8'?>\n<r:Content>City &amp; Guilds \u{a0}intermediate technical</r:Content>"
        );
    }

    #[test]
    fn collapse_file_rewrites_in_place() {
        let dir = temp_dir();
        let path = dir.join("us_ncds.xml");
        std::fs::write(&path, "<a>&#163;1\nper week</a>").unwrap();

        assert_eq!(collapse_file(&path).unwrap(), FileChange::Rewritten);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "<?xml version='1.0' encoding='UTF-8'?>\n<a>£1 per week</a>"
        );

        // Second run reproduces the same bytes.
        assert_eq!(collapse_file(&path).unwrap(), FileChange::Unchanged);
        assert_eq!(files::list_files(&dir).unwrap(), vec![path]);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn parse_failure_leaves_file_alone() {
        let dir = temp_dir();
        let path = dir.join("broken.xml");
        let raw = "<a>City &amp;amp; Guilds &#160:x</a>";
        std::fs::write(&path, raw).unwrap();

        let err = collapse_file(&path).unwrap_err();

        assert!(matches!(err, ScrubError::Parse { .. }));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), raw);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn invalid_utf8_is_a_parse_error() {
        let dir = temp_dir();
        let path = dir.join("latin1.xml");
        std::fs::write(&path, b"<a>\xa3</a>").unwrap();

        let err = collapse_file(&path).unwrap_err();
        assert!(err.to_string().contains("byte 3"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn parse_failure_leaves_no_scratch_files() {
        let dir = temp_dir();
        let path = dir.join("b.xml");
        std::fs::write(&path, "<b>").unwrap();

        assert!(collapse_file(&path).is_err());

        assert_eq!(files::list_files(&dir).unwrap(), vec![path.clone()]);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "<b>");
        std::fs::remove_dir_all(&dir).ok();
    }

    #[cfg(unix)]
    #[test]
    fn rewrite_keeps_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = temp_dir();
        let path = dir.join("a.xml");
        std::fs::write(&path, "<a>x\ny</a>").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o664)).unwrap();

        assert_eq!(collapse_file(&path).unwrap(), FileChange::Rewritten);

        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o664);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_export_is_collapsed_at_its_destination() {
        let root = temp_dir();
        let exports = root.join("archivist_xml");
        std::fs::create_dir(&exports).unwrap();
        let real = root.join("real.data");
        std::fs::write(&real, "<a>x\ny</a>").unwrap();
        let link = exports.join("a.xml");
        std::os::unix::fs::symlink("../real.data", &link).unwrap();

        assert_eq!(collapse_file(&link).unwrap(), FileChange::Rewritten);

        assert!(std::fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert!(std::fs::read_to_string(&real).unwrap().ends_with("<a>x y</a>"));
        assert_eq!(files::list_files(&root).unwrap(), vec![real]);

        std::fs::remove_dir_all(&root).ok();
    }
}
