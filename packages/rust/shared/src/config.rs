//! Application configuration for xmlscrub.
//!
//! User config lives at `~/.xmlscrub/xmlscrub.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScrubError};
use crate::types::FailurePolicy;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "xmlscrub.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".xmlscrub";

/// File name of the fetch stage's companion log.
pub const DOWNLOAD_LOG_NAME: &str = "download_list.csv";

// ---------------------------------------------------------------------------
// Config structs (matching xmlscrub.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Repair run behavior.
    #[serde(default)]
    pub repair: RepairSection,

    /// Where the export stage leaves its files.
    #[serde(default)]
    pub export: ExportSection,
}

/// `[repair]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairSection {
    /// Stop at the first failing file, or record it and continue.
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Files processed at once within a stage.
    #[serde(default = "default_jobs")]
    pub jobs: usize,
}

impl Default for RepairSection {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::default(),
            jobs: default_jobs(),
        }
    }
}

fn default_jobs() -> usize {
    1
}

/// `[export]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportSection {
    /// Directory holding one `<prefix>.xml` per instrument.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Tab-separated list of instruments to export.
    #[serde(default = "default_prefix_list")]
    pub prefix_list: String,

    /// Explicit download log path. Defaults to `download_list.csv`
    /// beside the output directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_log: Option<String>,
}

impl Default for ExportSection {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            prefix_list: default_prefix_list(),
            download_log: None,
        }
    }
}

fn default_output_dir() -> String {
    "export_xml/archivist_xml".into()
}
fn default_prefix_list() -> String {
    "Prefixes_to_export.txt".into()
}

impl ExportSection {
    /// Resolve the download log location.
    pub fn download_log_path(&self) -> PathBuf {
        match &self.download_log {
            Some(p) => PathBuf::from(p),
            None => {
                let out = Path::new(&self.output_dir);
                out.parent()
                    .unwrap_or_else(|| Path::new(""))
                    .join(DOWNLOAD_LOG_NAME)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Repair options (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime repair options, merged from config file and CLI flags.
#[derive(Debug, Clone, Copy)]
pub struct RepairOptions {
    /// Batch behavior on a failing file.
    pub failure_policy: FailurePolicy,
    /// Concurrent files per stage (1 = strictly sequential).
    pub jobs: usize,
}

impl Default for RepairOptions {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for RepairOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            failure_policy: config.repair.failure_policy,
            jobs: config.repair.jobs,
        }
    }
}

impl RepairOptions {
    /// Reject option combinations that cannot run.
    pub fn validate(&self) -> Result<()> {
        if self.jobs == 0 {
            return Err(ScrubError::config("jobs must be at least 1"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.xmlscrub/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ScrubError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.xmlscrub/xmlscrub.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ScrubError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| ScrubError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ScrubError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ScrubError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ScrubError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("failure_policy = \"abort\""));
        assert!(toml_str.contains("Prefixes_to_export.txt"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.repair.jobs, 1);
        assert_eq!(parsed.repair.failure_policy, FailurePolicy::Abort);
        assert_eq!(parsed.export.output_dir, "export_xml/archivist_xml");
    }

    #[test]
    fn config_with_overrides() {
        let toml_str = r#"
[repair]
failure_policy = "continue"
jobs = 4

[export]
output_dir = "/data/xml"
download_log = "/data/log.csv"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        let opts = RepairOptions::from(&config);
        assert_eq!(opts.failure_policy, FailurePolicy::Continue);
        assert_eq!(opts.jobs, 4);
        assert_eq!(config.export.download_log_path(), PathBuf::from("/data/log.csv"));
    }

    #[test]
    fn download_log_defaults_beside_output_dir() {
        let export = ExportSection::default();
        assert_eq!(
            export.download_log_path(),
            PathBuf::from("export_xml").join(DOWNLOAD_LOG_NAME)
        );
    }

    #[test]
    fn zero_jobs_rejected() {
        let opts = RepairOptions {
            failure_policy: FailurePolicy::Abort,
            jobs: 0,
        };
        let err = opts.validate().unwrap_err();
        assert!(err.to_string().contains("jobs must be at least 1"));
    }

    #[test]
    fn load_from_missing_file_is_io_error() {
        let path = std::env::temp_dir().join(format!("xs_missing_{}.toml", uuid::Uuid::now_v7()));
        let err = load_config_from(&path).unwrap_err();
        assert!(matches!(err, ScrubError::Io { .. }));
    }
}
