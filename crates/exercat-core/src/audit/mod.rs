//! Run audit: content hashes, the run summary and the append-only trail.

pub mod hashing;
pub mod report;
pub mod writer;

pub use hashing::{compute_sha256, fingerprint, verify_sha256};
pub use report::{ChangeSample, FileHash, RunArtifacts, RunCounts, RunState, RunSummary, Tool};
pub use writer::{
    append_history_csv, append_run_log, render_markdown, write_conflicts_md, write_curation_csv,
    write_preview_csv, write_preview_md,
};
