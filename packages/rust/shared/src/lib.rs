//! Shared types, error model, configuration, and file plumbing for xmlscrub.
//!
//! This crate is the foundation depended on by all other xmlscrub crates.
//! It provides:
//! - [`ScrubError`]: the unified error type
//! - Domain types ([`Stage`], [`FailurePolicy`], [`StageReport`])
//! - Configuration ([`AppConfig`], [`RepairOptions`], config loading)
//! - Directory listing and atomic in-place rewrites ([`files`])

pub mod config;
pub mod error;
pub mod files;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DOWNLOAD_LOG_NAME, ExportSection, RepairOptions, RepairSection, config_dir,
    config_file_path, init_config, load_config, load_config_from,
};
pub use error::{Result, ScrubError};
pub use types::{FailurePolicy, FileChange, FileFailure, Stage, StageReport};
