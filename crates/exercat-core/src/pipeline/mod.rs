//! Tool runs: staging, planning, execution and the audit trail.
//!
//! Every run walks the same state machine:
//!
//! ```text
//! STAGING -> PLANNING -> DRY_RUN_REPORT
//!                     -> BACKUP -> APPLYING -> COMMITTED | ROLLED_BACK
//! ```
//!
//! with `INPUT_ERROR` and `DUPLICATES_FOUND` as early exits that never touch
//! the catalog. Whatever the outcome, one entry is appended to the audit log
//! before the run returns.

pub mod backfill;
pub mod merge;
pub mod reconcile;

use std::borrow::Cow;
use std::path::PathBuf;
use tracing::{error, info, warn};

use crate::audit::{
    append_history_csv, append_run_log, fingerprint, verify_sha256, write_conflicts_md, write_preview_csv,
    write_preview_md, RunState, RunSummary,
};
use crate::config::RunOptions;
use crate::error::{CatalogError, Result};
use crate::normalize::{Normalizer, Vocabulary};
use crate::planner::MergeDecision;
use crate::source::{load_source, ColumnMap, SheetRef, SourceRows};
use crate::store::{create_backup, Catalog, DuplicateGroup};

pub use backfill::plan_sweep;
pub use reconcile::ReconcileInputs;

/// A tabular source file and the sheet to read from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
    pub path: PathBuf,
    pub sheet: Option<SheetRef>,
}

impl SourceSpec {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            sheet: None,
        }
    }

    pub fn with_sheet(mut self, sheet: SheetRef) -> Self {
        self.sheet = Some(sheet);
        self
    }
}

/// How a run ended, when it ended without a store error.
#[derive(Debug)]
pub enum MergeOutcome {
    /// Dry-run report written, or changes committed.
    Completed(RunSummary),
    /// Identity duplicates in the catalog blocked the run.
    DuplicatesFound {
        summary: RunSummary,
        duplicates: Vec<DuplicateGroup>,
    },
    /// A source could not be read or mapped.
    InputError {
        summary: RunSummary,
        error: CatalogError,
    },
}

impl MergeOutcome {
    pub fn summary(&self) -> &RunSummary {
        match self {
            MergeOutcome::Completed(summary)
            | MergeOutcome::DuplicatesFound { summary, .. }
            | MergeOutcome::InputError { summary, .. } => summary,
        }
    }

    /// Process exit code: 0 done, 2 input error, 3 duplicates.
    pub fn exit_code(&self) -> i32 {
        match self {
            MergeOutcome::Completed(_) => 0,
            MergeOutcome::DuplicatesFound { .. } => 3,
            MergeOutcome::InputError { error, .. } => error.exit_code(),
        }
    }
}

/// Where a run body stopped.
pub(crate) enum Stop {
    Done,
    Duplicates(Vec<DuplicateGroup>),
}

/// Move to `state`, logging the transition.
pub(crate) fn transition(summary: &mut RunSummary, state: RunState) {
    info!(
        "Run {}: {} -> {}",
        short_id(&summary.run_id),
        summary.state.as_str(),
        state.as_str()
    );
    summary.state = state;
}

fn short_id(run_id: &str) -> &str {
    run_id.get(..8).unwrap_or(run_id)
}

/// Runs the catalog tools with one set of options.
#[derive(Debug, Clone)]
pub struct Pipeline {
    options: RunOptions,
    normalizer: Normalizer,
    columns: ColumnMap,
}

impl Pipeline {
    pub fn new(options: RunOptions) -> Self {
        let columns = options
            .column_aliases
            .iter()
            .fold(ColumnMap::default(), |map, (alias, target)| map.with_alias(alias, *target));
        Self {
            options,
            normalizer: Normalizer::default(),
            columns,
        }
    }

    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Run `body`, then append the audit entry whatever happened.
    ///
    /// Input errors become [`MergeOutcome::InputError`]; any other error is
    /// recorded with its cause chain and returned after the audit entry is
    /// written.
    pub(crate) fn run_guarded<F>(&self, mut summary: RunSummary, body: F) -> Result<MergeOutcome>
    where
        F: FnOnce(&Self, &mut RunSummary) -> Result<Stop>,
    {
        let result = self
            .with_vocabulary_override()
            .and_then(|pipeline| body(&pipeline, &mut summary));
        match result {
            Ok(Stop::Done) => {
                self.append_audit(&mut summary)?;
                Ok(MergeOutcome::Completed(summary))
            }
            Ok(Stop::Duplicates(duplicates)) => {
                self.append_audit(&mut summary)?;
                Ok(MergeOutcome::DuplicatesFound { summary, duplicates })
            }
            Err(err) if err.is_input_error() => {
                error!("Input error: {}", err);
                summary.fail(RunState::InputError, err.trace());
                self.append_audit(&mut summary)?;
                Ok(MergeOutcome::InputError { summary, error: err })
            }
            Err(err) => {
                let state = if summary.state == RunState::Applying {
                    RunState::RolledBack
                } else {
                    summary.state
                };
                error!("Run failed in {}: {}", state.as_str(), err);
                summary.fail(state, err.trace());
                if let Err(audit_err) = self.append_audit(&mut summary) {
                    error!("Failed to append audit entry: {}", audit_err);
                }
                Err(err)
            }
        }
    }

    /// This pipeline, or a copy using the vocabulary named in the options.
    fn with_vocabulary_override(&self) -> Result<Cow<'_, Self>> {
        let Some(path) = &self.options.vocabulary else {
            return Ok(Cow::Borrowed(self));
        };
        info!("Loading vocabulary from {}", path.display());
        let normalizer = Normalizer::new(Vocabulary::from_json_file(path)?);
        Ok(Cow::Owned(self.clone().with_normalizer(normalizer)))
    }

    fn append_audit(&self, summary: &mut RunSummary) -> Result<()> {
        summary.db_hash_after = self.hash_catalog()?;
        summary.finish();
        summary.artifacts.audit_log = Some(self.options.audit_log.clone());
        if let Some(history) = &self.options.history_csv {
            summary.artifacts.history_csv = Some(history.clone());
        }

        append_run_log(&self.options.audit_log, summary)?;
        if let Some(history) = &self.options.history_csv {
            append_history_csv(history, summary)?;
        }
        info!(
            "Run {} audit appended to {}",
            short_id(&summary.run_id),
            self.options.audit_log.display()
        );
        Ok(())
    }

    pub(crate) fn hash_catalog(&self) -> Result<Option<String>> {
        fingerprint(&self.options.db_path)
    }

    /// Read and hash one source file.
    pub(crate) fn load(&self, summary: &mut RunSummary, spec: &SourceSpec) -> Result<SourceRows> {
        let rows = load_source(&spec.path, spec.sheet.as_ref(), &self.columns, self.options.limit)?;
        summary.add_source(&spec.path, fingerprint(&spec.path)?);
        for header in &rows.unmapped_headers {
            summary.warn(format!(
                "{}: column '{}' ignored",
                spec.path.display(),
                header
            ));
        }
        Ok(rows)
    }

    /// Check catalog identities; on duplicates write the conflicts report.
    pub(crate) fn check_duplicates(
        &self,
        summary: &mut RunSummary,
        catalog: &Catalog,
    ) -> Result<Option<Vec<DuplicateGroup>>> {
        let duplicates = catalog.find_duplicates(self.options.nocase)?;
        if duplicates.is_empty() {
            return Ok(None);
        }
        warn!(
            "{} duplicate identity group(s) in catalog; nothing will be written",
            duplicates.len()
        );
        summary.record_duplicates(&duplicates);
        let report = self.options.conflicts_report_path();
        write_conflicts_md(&report, &duplicates, &summary.conflicts)?;
        summary.artifacts.conflicts_md = Some(report);
        transition(summary, RunState::DuplicatesFound);
        Ok(Some(duplicates))
    }

    /// Preview files requested for this run, written in either mode.
    pub(crate) fn write_previews(&self, summary: &mut RunSummary, decisions: &[MergeDecision]) -> Result<()> {
        if let Some(path) = &self.options.preview_csv {
            write_preview_csv(path, decisions)?;
            summary.artifacts.preview_csv = Some(path.clone());
        }
        if let Some(path) = &self.options.preview_md {
            write_preview_md(path, summary, decisions)?;
            summary.artifacts.preview_md = Some(path.clone());
        }
        if let Some(path) = &self.options.conflicts_md {
            if summary.counts.conflicts > 0 {
                write_conflicts_md(path, &summary.duplicates, &summary.conflicts)?;
                summary.artifacts.conflicts_md = Some(path.clone());
            }
        }
        Ok(())
    }

    /// Stop at the dry-run report, or back up and commit `decisions`.
    ///
    /// After commit the whole catalog is swept into canonical form in a
    /// second transaction.
    pub(crate) fn execute(&self, summary: &mut RunSummary, decisions: &[MergeDecision]) -> Result<()> {
        if self.options.mode.is_dry_run() {
            transition(summary, RunState::DryRunReport);
            return Ok(());
        }

        transition(summary, RunState::Backup);
        summary.artifacts.backup = create_backup(&self.options.db_path, self.options.backup_path.as_deref())?;
        match (&summary.artifacts.backup, &summary.db_hash_before) {
            (Some(backup), Some(expected)) => {
                if !verify_sha256(backup, expected)? {
                    return Err(CatalogError::BackupFailed {
                        path: backup.clone(),
                        message: "backup does not match the catalog it was taken from".to_string(),
                        source: None,
                    });
                }
            }
            (None, _) => summary.warn("no existing catalog to back up"),
            _ => {}
        }

        transition(summary, RunState::Applying);
        let mut catalog = Catalog::open(&self.options.db_path)?;
        let stats = catalog.apply(decisions, self.options.nocase)?;
        summary.record_apply(&stats);
        transition(summary, RunState::Committed);

        let sweep = plan_sweep(&self.normalizer, &catalog.load_records()?);
        if sweep.counts.updates > 0 {
            let swept = catalog.apply(&sweep.decisions, self.options.nocase)?;
            summary.counts.normalized_after_commit = swept.updated;
            summary.counts.mapping_rows = swept.mapping_rows;
            info!("Normalized {} rows after commit", swept.updated);
        }

        if self.options.optimize {
            catalog.optimize()?;
        }
        summary.spot_checks = Some(catalog.spot_checks()?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunMode;
    use crate::audit::Tool;
    use std::path::Path;

    #[test]
    fn test_outcome_exit_codes() {
        let summary = RunSummary::new(Tool::Merge, RunMode::DryRun, Path::new("c.db"));
        assert_eq!(MergeOutcome::Completed(summary.clone()).exit_code(), 0);
        assert_eq!(
            MergeOutcome::DuplicatesFound {
                summary: summary.clone(),
                duplicates: Vec::new(),
            }
            .exit_code(),
            3
        );
        assert_eq!(
            MergeOutcome::InputError {
                summary,
                error: CatalogError::FileNotFound(PathBuf::from("x.csv")),
            }
            .exit_code(),
            2
        );
    }

    #[test]
    fn test_missing_vocabulary_is_an_audited_input_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut options = RunOptions::new(RunMode::DryRun, dir.path().join("catalog.db"));
        options.vocabulary = Some(dir.path().join("vocab.json"));
        let audit_log = options.audit_log.clone();

        let outcome = Pipeline::new(options).backfill().unwrap();
        assert_eq!(outcome.exit_code(), 2);
        assert_eq!(outcome.summary().state, RunState::InputError);
        let log = std::fs::read_to_string(audit_log).unwrap();
        assert!(log.contains("INPUT_ERROR"));
        assert!(log.contains("vocab.json"));
    }

    #[test]
    fn test_transition_updates_state() {
        let mut summary = RunSummary::new(Tool::Backfill, RunMode::Apply, Path::new("c.db"));
        transition(&mut summary, RunState::Planning);
        assert_eq!(summary.state, RunState::Planning);
    }
}
