//! The audit record of one run.

use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::config::{AuditConfig, RunMode};
use crate::models::Column;
use crate::planner::{FieldConflict, MergeAction, MergePlan};
use crate::reconcile::{CurationEntry, MissingRow, Reconciliation};
use crate::staging::{Collision, StageResult};
use crate::store::{ApplyStats, DuplicateGroup, SpotChecks};

/// Which tool produced a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tool {
    Merge,
    Import,
    Reconcile,
    Backfill,
    SelfTest,
}

impl Tool {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tool::Merge => "merge",
            Tool::Import => "import",
            Tool::Reconcile => "reconcile",
            Tool::Backfill => "backfill",
            Tool::SelfTest => "self-test",
        }
    }
}

/// Run lifecycle. `DryRunReport`, `Committed` and `RolledBack` are terminal
/// for the catalog; `InputError` and `DuplicatesFound` stop before it is
/// touched. The state recorded in the audit entry is the last one reached
/// before the entry was appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Staging,
    Planning,
    DryRunReport,
    Backup,
    Applying,
    Committed,
    RolledBack,
    InputError,
    DuplicatesFound,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Staging => "STAGING",
            RunState::Planning => "PLANNING",
            RunState::DryRunReport => "DRY_RUN_REPORT",
            RunState::Backup => "BACKUP",
            RunState::Applying => "APPLYING",
            RunState::Committed => "COMMITTED",
            RunState::RolledBack => "ROLLED_BACK",
            RunState::InputError => "INPUT_ERROR",
            RunState::DuplicatesFound => "DUPLICATES_FOUND",
        }
    }
}

/// A hashed input or output file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileHash {
    pub path: PathBuf,
    pub sha256: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunCounts {
    pub csv_rows: usize,
    pub staged_rows: usize,
    pub skipped_rows: usize,
    pub collisions: usize,
    pub inserts: usize,
    pub updates: usize,
    pub noops: usize,
    pub skips: usize,
    pub conflicts: usize,
    pub columns_filled: usize,
    pub columns_already: usize,
    pub lists_extended: usize,
    pub ambiguous_fields: usize,
    pub forbidden_dropped: usize,
    pub missing_in_db: usize,
    pub duplicate_groups: usize,
    /// Rows rewritten by the post-commit normalization sweep.
    pub normalized_after_commit: usize,
    pub mapping_rows: usize,
}

/// One changed column, for the capped sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeSample {
    pub exercise_name: String,
    pub action: MergeAction,
    pub column: Column,
    pub old: Option<String>,
    pub new: Option<String>,
}

/// Generated side files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunArtifacts {
    pub audit_log: Option<PathBuf>,
    pub history_csv: Option<PathBuf>,
    pub backup: Option<PathBuf>,
    pub preview_csv: Option<PathBuf>,
    pub preview_md: Option<PathBuf>,
    pub conflicts_md: Option<PathBuf>,
    pub curation_csv: Option<PathBuf>,
}

/// The audit record of one execution.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub tool: Tool,
    pub mode: RunMode,
    pub state: RunState,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub db_path: PathBuf,
    pub sources: Vec<FileHash>,
    pub db_hash_before: Option<String>,
    pub db_hash_after: Option<String>,
    pub counts: RunCounts,
    pub retry_attempts: u32,
    /// First changes, capped at [`AuditConfig::SAMPLE_LIMIT`].
    pub samples: Vec<ChangeSample>,
    /// First conflicts, capped at [`AuditConfig::CONFLICT_LIMIT`].
    pub conflicts: Vec<FieldConflict>,
    /// First curation entries, capped at [`AuditConfig::CURATION_LIMIT`].
    pub curation: Vec<CurationEntry>,
    pub collisions: Vec<Collision>,
    pub duplicates: Vec<DuplicateGroup>,
    pub missing_in_db: Vec<MissingRow>,
    pub spot_checks: Option<SpotChecks>,
    pub warnings: Vec<String>,
    /// Failure message with its full cause chain.
    pub error: Option<String>,
    pub artifacts: RunArtifacts,
}

impl RunSummary {
    pub fn new(tool: Tool, mode: RunMode, db_path: &Path) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            tool,
            mode,
            state: RunState::Staging,
            started_at: Utc::now().to_rfc3339(),
            finished_at: None,
            db_path: db_path.to_path_buf(),
            sources: Vec::new(),
            db_hash_before: None,
            db_hash_after: None,
            counts: RunCounts::default(),
            retry_attempts: 0,
            samples: Vec::new(),
            conflicts: Vec::new(),
            curation: Vec::new(),
            collisions: Vec::new(),
            duplicates: Vec::new(),
            missing_in_db: Vec::new(),
            spot_checks: None,
            warnings: Vec::new(),
            error: None,
            artifacts: RunArtifacts::default(),
        }
    }

    pub fn add_source(&mut self, path: &Path, sha256: Option<String>) {
        self.sources.push(FileHash {
            path: path.to_path_buf(),
            sha256,
        });
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn record_staging(&mut self, staged: &StageResult) {
        self.counts.csv_rows += staged.csv_rows;
        self.counts.staged_rows += staged.staged_rows;
        self.counts.skipped_rows += staged.skipped.len();
        self.counts.collisions += staged.collisions.len();
        self.collisions.extend(staged.collisions.iter().cloned());
        for skipped in &staged.skipped {
            self.warn(format!("row {} skipped: {}", skipped.row_number, skipped.reason));
        }
    }

    pub fn record_plan(&mut self, plan: &MergePlan) {
        let counts = &plan.counts;
        self.counts.inserts = counts.inserts;
        self.counts.updates = counts.updates;
        self.counts.noops = counts.noops;
        self.counts.skips = counts.skips;
        self.counts.conflicts = counts.conflicts;
        self.counts.columns_filled = counts.columns_filled;
        self.counts.columns_already = counts.columns_already;
        self.counts.lists_extended = counts.lists_extended;

        self.samples = plan
            .decisions
            .iter()
            .flat_map(|d| {
                d.changes.iter().map(move |c| ChangeSample {
                    exercise_name: d.exercise_name.clone(),
                    action: d.action,
                    column: c.column,
                    old: c.old.clone(),
                    new: c.new.clone(),
                })
            })
            .take(AuditConfig::SAMPLE_LIMIT)
            .collect();
        self.conflicts = plan
            .conflicts()
            .take(AuditConfig::CONFLICT_LIMIT)
            .cloned()
            .collect();
    }

    pub fn record_reconciliation(&mut self, reconciliation: &Reconciliation) {
        self.record_plan(&reconciliation.plan);
        let counts = &reconciliation.counts;
        self.counts.ambiguous_fields = counts.ambiguous_fields;
        self.counts.forbidden_dropped = counts.forbidden_dropped;
        self.counts.missing_in_db = counts.missing_in_db;
        self.curation = reconciliation
            .curation
            .iter()
            .take(AuditConfig::CURATION_LIMIT)
            .cloned()
            .collect();
        self.missing_in_db = reconciliation.missing_in_db.clone();
    }

    pub fn record_duplicates(&mut self, duplicates: &[DuplicateGroup]) {
        self.counts.duplicate_groups = duplicates.len();
        self.duplicates = duplicates.to_vec();
    }

    pub fn record_apply(&mut self, stats: &ApplyStats) {
        self.counts.mapping_rows = stats.mapping_rows;
        self.retry_attempts = stats.attempts;
    }

    /// Record a failure with its cause chain.
    pub fn fail(&mut self, state: RunState, trace: String) {
        self.state = state;
        self.error = Some(trace);
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now().to_rfc3339());
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.state != RunState::DuplicatesFound
    }

    /// Whether the catalog was modified by this run.
    pub fn db_changed(&self) -> bool {
        self.db_hash_before != self.db_hash_after
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExerciseRecord, ScalarColumn};
    use crate::normalize::Normalizer;
    use crate::planner::MergePlanner;
    use crate::source::RawRow;
    use crate::staging::stage;

    #[test]
    fn test_new_summary_identity() {
        let a = RunSummary::new(Tool::Merge, RunMode::DryRun, Path::new("catalog.db"));
        let b = RunSummary::new(Tool::Merge, RunMode::DryRun, Path::new("catalog.db"));
        assert_ne!(a.run_id, b.run_id);
        assert_eq!(a.state, RunState::Staging);
        assert!(chrono::DateTime::parse_from_rfc3339(&a.started_at).is_ok());
    }

    #[test]
    fn test_record_plan_caps_samples() {
        let rows: Vec<RawRow> = (0..40)
            .map(|i| RawRow::named(i + 2, &format!("Exercise {i}")).with_scalar(ScalarColumn::Force, "push"))
            .collect();
        let staged = stage(&rows, &Normalizer::default());
        let plan = MergePlanner::default().plan_all(&[], &staged);

        let mut summary = RunSummary::new(Tool::Merge, RunMode::DryRun, Path::new("c.db"));
        summary.record_staging(&staged);
        summary.record_plan(&plan);
        assert_eq!(summary.counts.inserts, 40);
        assert_eq!(summary.samples.len(), AuditConfig::SAMPLE_LIMIT);
        assert_eq!(summary.counts.csv_rows, 40);
    }

    #[test]
    fn test_conflicts_recorded() {
        let catalog = vec![ExerciseRecord::new("Dip").with_scalar(ScalarColumn::Force, "Push")];
        let staged = stage(
            &[RawRow::named(2, "Dip").with_scalar(ScalarColumn::Force, "pull")],
            &Normalizer::default(),
        );
        let plan = MergePlanner::default().plan_all(&catalog, &staged);
        let mut summary = RunSummary::new(Tool::Merge, RunMode::Apply, Path::new("c.db"));
        summary.record_plan(&plan);
        assert_eq!(summary.counts.conflicts, 1);
        assert_eq!(summary.conflicts[0].existing, "Push");
        assert!(summary.is_success());
    }

    #[test]
    fn test_fail_records_trace() {
        let mut summary = RunSummary::new(Tool::Backfill, RunMode::Apply, Path::new("c.db"));
        summary.fail(RunState::RolledBack, "boom\n  caused by: disk".into());
        assert!(!summary.is_success());
        assert_eq!(summary.state.as_str(), "ROLLED_BACK");
    }
}
