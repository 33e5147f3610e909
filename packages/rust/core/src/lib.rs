//! Repair pipeline orchestration for xmlscrub.
//!
//! This crate ties the entity normalizer, the XML whitespace collapser, and
//! the export manifest into end-to-end directory runs (e.g., `repair_dir`).

pub mod pipeline;

pub use pipeline::{
    ProgressReporter, RepairConfig, RepairReport, SilentProgress, collapse_dir, normalize_dir,
    repair_dir, run_stage,
};
