//! Centralized configuration for the catalog engine.
//!
//! Constants for the store, retry behavior, backups and audit output, plus the
//! per-run option struct the CLI fills in.

use std::path::PathBuf;
use std::time::Duration;

use crate::source::SourceTarget;

/// Catalog store configuration.
pub struct StoreConfig;

impl StoreConfig {
    pub const EXERCISES_TABLE: &'static str = "exercises";
    pub const MUSCLE_MAP_TABLE: &'static str = "exercise_isolated_muscles";
    pub const NOCASE_INDEX: &'static str = "idx_exercises_name_nocase";
    pub const BUSY_TIMEOUT_MS: u32 = 5_000;
    pub const BUSY_RETRY_ATTEMPTS: u32 = 4;
    pub const BUSY_RETRY_BASE_DELAY: Duration = Duration::from_millis(250);
    pub const BUSY_RETRY_MAX_DELAY: Duration = Duration::from_secs(4);
}

/// Backup file naming.
pub struct BackupConfig;

impl BackupConfig {
    pub const TIMESTAMP_FORMAT: &'static str = "%Y%m%d-%H%M%S";
    pub const SUFFIX: &'static str = "backup";
}

/// Audit trail configuration.
pub struct AuditConfig;

impl AuditConfig {
    pub const DEFAULT_LOG_FILE: &'static str = "exercat-runs.md";
    /// Written next to the audit log when identity duplicates block a run.
    pub const DEFAULT_CONFLICTS_FILE: &'static str = "exercat-conflicts.md";
    /// Individual changes listed per run entry.
    pub const SAMPLE_LIMIT: usize = 25;
    /// Conflicts listed per run entry.
    pub const CONFLICT_LIMIT: usize = 50;
    /// Curation entries echoed into the run entry (the CSV has all of them).
    pub const CURATION_LIMIT: usize = 25;
}

/// Whether a run may mutate the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    DryRun,
    Apply,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::DryRun => "dry-run",
            RunMode::Apply => "apply",
        }
    }

    pub fn is_dry_run(&self) -> bool {
        matches!(self, RunMode::DryRun)
    }
}

/// How a populated scalar column reacts to a different incoming value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Fill-only: the catalog value always wins.
    #[default]
    KeepExisting,
    /// Explicit update mode: the incoming value replaces the catalog value.
    PreferIncoming,
}

/// What the reconciliation tool does with rows that carry an ambiguous field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AmbiguityPolicy {
    /// Leave the whole row out of the apply set.
    #[default]
    SkipRow,
    /// Apply the row's resolved fields and omit only the ambiguous ones.
    ApplyPartial,
}

/// Options shared by every tool run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub mode: RunMode,
    /// Catalog store path.
    pub db_path: PathBuf,
    /// Cap on source rows read.
    pub limit: Option<usize>,
    /// Case-insensitive identity uniqueness in the catalog.
    pub nocase: bool,
    /// Unmatched incoming rows are skipped instead of inserted.
    pub update_only: bool,
    pub conflict_policy: ConflictPolicy,
    pub ambiguity_policy: AmbiguityPolicy,
    /// Explicit backup path; defaults to a timestamped sibling of the store.
    pub backup_path: Option<PathBuf>,
    pub preview_csv: Option<PathBuf>,
    pub preview_md: Option<PathBuf>,
    pub curation_csv: Option<PathBuf>,
    /// Conflicts report; defaults next to the audit log when duplicates are found.
    pub conflicts_md: Option<PathBuf>,
    pub audit_log: PathBuf,
    pub history_csv: Option<PathBuf>,
    /// Run `PRAGMA optimize` and `VACUUM` after commit.
    pub optimize: bool,
    /// Vocabulary override loaded at the start of the run.
    pub vocabulary: Option<PathBuf>,
    /// Extra source header aliases, on top of the built-in table.
    pub column_aliases: Vec<(String, SourceTarget)>,
}

impl RunOptions {
    /// Options for a run against `db_path` with everything else defaulted.
    pub fn new(mode: RunMode, db_path: impl Into<PathBuf>) -> Self {
        let db_path = db_path.into();
        let audit_log = db_path
            .parent()
            .map(|p| p.join(AuditConfig::DEFAULT_LOG_FILE))
            .unwrap_or_else(|| PathBuf::from(AuditConfig::DEFAULT_LOG_FILE));
        Self {
            mode,
            db_path,
            limit: None,
            nocase: false,
            update_only: false,
            conflict_policy: ConflictPolicy::default(),
            ambiguity_policy: AmbiguityPolicy::default(),
            backup_path: None,
            preview_csv: None,
            preview_md: None,
            curation_csv: None,
            conflicts_md: None,
            audit_log,
            history_csv: None,
            optimize: false,
            vocabulary: None,
            column_aliases: Vec::new(),
        }
    }

    /// Where the conflicts report goes for this run.
    pub fn conflicts_report_path(&self) -> PathBuf {
        self.conflicts_md.clone().unwrap_or_else(|| {
            self.audit_log
                .parent()
                .map(|p| p.join(AuditConfig::DEFAULT_CONFLICTS_FILE))
                .unwrap_or_else(|| PathBuf::from(AuditConfig::DEFAULT_CONFLICTS_FILE))
        })
    }
}
