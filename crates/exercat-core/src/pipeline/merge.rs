//! Merge (and import) of one tabular source into the catalog.

use tracing::info;

use crate::audit::{RunState, RunSummary, Tool};
use crate::error::Result;
use crate::planner::MergePlanner;
use crate::staging::stage;
use crate::store::Catalog;

use super::{transition, MergeOutcome, Pipeline, SourceSpec, Stop};

impl Pipeline {
    /// Merge `source` into the catalog under the run's conflict policy.
    ///
    /// `tool` is [`Tool::Merge`] or [`Tool::Import`]; they differ only in how
    /// the run is labelled in the audit trail.
    pub fn merge(&self, source: &SourceSpec, tool: Tool) -> Result<MergeOutcome> {
        let summary = RunSummary::new(tool, self.options.mode, &self.options.db_path);
        self.run_guarded(summary, |pipeline, summary| pipeline.merge_body(summary, source))
    }

    fn merge_body(&self, summary: &mut RunSummary, source: &SourceSpec) -> Result<Stop> {
        summary.db_hash_before = self.hash_catalog()?;

        let rows = self.load(summary, source)?;
        let staged = stage(&rows.rows, &self.normalizer);
        summary.record_staging(&staged);
        info!(
            "Staged {} of {} rows from {}",
            staged.staged_rows,
            staged.csv_rows,
            source.path.display()
        );

        transition(summary, RunState::Planning);
        let catalog = Catalog::open_read_only(&self.options.db_path)?;
        if let Some(duplicates) = self.check_duplicates(summary, &catalog)? {
            return Ok(Stop::Duplicates(duplicates));
        }
        let records = catalog.load_records()?;
        drop(catalog);

        let planner = MergePlanner::new(self.options.conflict_policy, self.options.update_only);
        let plan = planner.plan_all(&records, &staged);
        summary.record_plan(&plan);
        info!(
            "Plan: {} inserts, {} updates, {} no-ops, {} skipped, {} conflicts",
            plan.counts.inserts,
            plan.counts.updates,
            plan.counts.noops,
            plan.counts.skips,
            plan.counts.conflicts
        );

        self.write_previews(summary, &plan.decisions)?;
        self.execute(summary, &plan.decisions)?;
        Ok(Stop::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConflictPolicy, RunMode, RunOptions};
    use crate::models::ScalarColumn;
    use std::path::Path;
    use tempfile::TempDir;

    fn write_source(dir: &Path, body: &str) -> SourceSpec {
        let path = dir.join("incoming.csv");
        std::fs::write(&path, body).unwrap();
        SourceSpec::new(path)
    }

    fn pipeline(dir: &Path, mode: RunMode) -> Pipeline {
        Pipeline::new(RunOptions::new(mode, dir.join("catalog.db")))
    }

    #[test]
    fn test_dry_run_leaves_no_catalog() {
        let dir = TempDir::new().unwrap();
        let source = write_source(dir.path(), "exercise_name,force\nSquat,push\n");

        let outcome = pipeline(dir.path(), RunMode::DryRun)
            .merge(&source, Tool::Merge)
            .unwrap();
        let summary = outcome.summary();
        assert_eq!(outcome.exit_code(), 0);
        assert_eq!(summary.state, RunState::DryRunReport);
        assert_eq!(summary.counts.inserts, 1);
        assert!(!dir.path().join("catalog.db").exists());
        assert!(dir.path().join("exercat-runs.md").exists());
    }

    #[test]
    fn test_apply_inserts_then_noops() {
        let dir = TempDir::new().unwrap();
        let source = write_source(dir.path(), "exercise_name,force,equipment\nSquat,push,barbell\n");
        let apply = pipeline(dir.path(), RunMode::Apply);

        let first = apply.merge(&source, Tool::Merge).unwrap();
        assert_eq!(first.summary().state, RunState::Committed);
        assert_eq!(first.summary().counts.inserts, 1);
        assert!(first.summary().db_changed());

        let second = apply.merge(&source, Tool::Merge).unwrap();
        assert_eq!(second.summary().counts.inserts, 0);
        assert_eq!(second.summary().counts.updates, 0);
        assert_eq!(second.summary().counts.noops, 1);
    }

    #[test]
    fn test_missing_source_is_input_error() {
        let dir = TempDir::new().unwrap();
        let outcome = pipeline(dir.path(), RunMode::Apply)
            .merge(&SourceSpec::new(dir.path().join("absent.csv")), Tool::Import)
            .unwrap();
        assert_eq!(outcome.exit_code(), 2);
        assert_eq!(outcome.summary().state, RunState::InputError);
        assert!(!dir.path().join("catalog.db").exists());
    }

    #[test]
    fn test_prefer_incoming_overwrites() {
        let dir = TempDir::new().unwrap();
        let apply = pipeline(dir.path(), RunMode::Apply);
        apply
            .merge(&write_source(dir.path(), "exercise_name,force\nDip,push\n"), Tool::Merge)
            .unwrap();

        let mut options = RunOptions::new(RunMode::Apply, dir.path().join("catalog.db"));
        options.conflict_policy = ConflictPolicy::PreferIncoming;
        let outcome = Pipeline::new(options)
            .merge(&write_source(dir.path(), "exercise_name,force\nDip,pull\n"), Tool::Merge)
            .unwrap();
        assert_eq!(outcome.summary().counts.updates, 1);

        let records = Catalog::open_read_only(&dir.path().join("catalog.db"))
            .unwrap()
            .load_records()
            .unwrap();
        assert_eq!(records[0].fields.scalar(ScalarColumn::Force), Some("Pull"));
    }
}
