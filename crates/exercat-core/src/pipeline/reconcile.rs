//! Three-source muscle reconciliation run.

use tracing::info;

use crate::audit::{write_curation_csv, RunState, RunSummary, Tool};
use crate::error::Result;
use crate::reconcile::{ExternalSources, Reconciler};
use crate::staging::{stage, StageResult};
use crate::store::Catalog;

use super::{transition, MergeOutcome, Pipeline, SourceSpec, Stop};

/// External sources for a reconciliation run. Either may be absent; with
/// neither, every catalog row is a no-op.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileInputs {
    pub merge_preview: Option<SourceSpec>,
    pub musclewiki: Option<SourceSpec>,
}

impl Pipeline {
    /// Resolve catalog muscle fields against the ranked external sources.
    pub fn reconcile(&self, inputs: &ReconcileInputs) -> Result<MergeOutcome> {
        let summary = RunSummary::new(Tool::Reconcile, self.options.mode, &self.options.db_path);
        self.run_guarded(summary, |pipeline, summary| pipeline.reconcile_body(summary, inputs))
    }

    fn stage_optional(&self, summary: &mut RunSummary, spec: Option<&SourceSpec>) -> Result<Option<StageResult>> {
        let Some(spec) = spec else {
            return Ok(None);
        };
        let rows = self.load(summary, spec)?;
        let staged = stage(&rows.rows, &self.normalizer);
        summary.record_staging(&staged);
        info!(
            "Staged {} rows from {}",
            staged.staged_rows,
            spec.path.display()
        );
        Ok(Some(staged))
    }

    fn reconcile_body(&self, summary: &mut RunSummary, inputs: &ReconcileInputs) -> Result<Stop> {
        summary.db_hash_before = self.hash_catalog()?;

        let sources = ExternalSources {
            merge_preview: self.stage_optional(summary, inputs.merge_preview.as_ref())?,
            musclewiki: self.stage_optional(summary, inputs.musclewiki.as_ref())?,
        };

        transition(summary, RunState::Planning);
        let catalog = Catalog::open_read_only(&self.options.db_path)?;
        if let Some(duplicates) = self.check_duplicates(summary, &catalog)? {
            return Ok(Stop::Duplicates(duplicates));
        }
        let records = catalog.load_records()?;
        drop(catalog);

        let reconciliation =
            Reconciler::new(&self.normalizer, self.options.ambiguity_policy).reconcile(&records, &sources);
        summary.record_reconciliation(&reconciliation);
        let counts = &reconciliation.counts;
        info!(
            "Reconciled {} rows: {} changed, {} ambiguous fields, {} skipped, {} missing in catalog",
            counts.rows_examined,
            counts.rows_changed,
            counts.ambiguous_fields,
            counts.rows_skipped_ambiguous,
            counts.missing_in_db
        );

        if let Some(path) = &self.options.curation_csv {
            write_curation_csv(path, &reconciliation.curation)?;
            summary.artifacts.curation_csv = Some(path.clone());
        }
        self.write_previews(summary, &reconciliation.plan.decisions)?;
        self.execute(summary, &reconciliation.plan.decisions)?;
        Ok(Stop::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AmbiguityPolicy, RunMode, RunOptions};
    use crate::models::{ExerciseRecord, ScalarColumn};
    use crate::normalize::text::normalized_key;
    use crate::planner::{MergeAction, MergeDecision};
    use std::path::Path;
    use tempfile::TempDir;

    fn seed(db: &Path, records: &[ExerciseRecord]) {
        let decisions: Vec<MergeDecision> = records
            .iter()
            .map(|r| MergeDecision {
                key: normalized_key(&r.exercise_name),
                exercise_name: r.exercise_name.clone(),
                action: MergeAction::Insert,
                fields: r.fields.clone(),
                changes: Vec::new(),
                conflicts: Vec::new(),
                notes: Vec::new(),
                columns_filled: 0,
                columns_already: 0,
                lists_extended: 0,
            })
            .collect();
        Catalog::open(db).unwrap().apply(&decisions, false).unwrap();
    }

    fn primary(db: &Path, name: &str) -> Option<String> {
        let records = Catalog::open_read_only(db).unwrap().load_records().unwrap();
        records
            .into_iter()
            .find(|r| r.exercise_name == name)
            .and_then(|r| r.fields.scalar(ScalarColumn::PrimaryMuscleGroup).map(str::to_string))
    }

    #[test]
    fn test_preview_source_wins_and_curation_written() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("catalog.db");
        seed(
            &db,
            &[
                ExerciseRecord::new("Lateral Raise").with_scalar(ScalarColumn::PrimaryMuscleGroup, "Shoulders"),
                ExerciseRecord::new("Mystery Move").with_scalar(ScalarColumn::PrimaryMuscleGroup, "Chest"),
            ],
        );
        let preview = dir.path().join("preview.csv");
        std::fs::write(
            &preview,
            "exercise_name,primary_muscle_group\nLateral Raise,side delts\nMystery Move,spleen\n",
        )
        .unwrap();

        let mut options = RunOptions::new(RunMode::Apply, &db);
        options.curation_csv = Some(dir.path().join("curation.csv"));
        let outcome = Pipeline::new(options)
            .reconcile(&ReconcileInputs {
                merge_preview: Some(SourceSpec::new(&preview)),
                musclewiki: None,
            })
            .unwrap();

        assert_eq!(outcome.summary().state, RunState::Committed);
        assert_eq!(primary(&db, "Lateral Raise").as_deref(), Some("Middle-Shoulder"));
        assert_eq!(primary(&db, "Mystery Move").as_deref(), Some("Chest"));
        let curation = std::fs::read_to_string(dir.path().join("curation.csv")).unwrap();
        assert!(curation.contains("Mystery Move"));
    }

    #[test]
    fn test_dry_run_reconcile_is_pure() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("catalog.db");
        seed(
            &db,
            &[ExerciseRecord::new("Face Pull").with_scalar(ScalarColumn::PrimaryMuscleGroup, "Shoulders")],
        );
        let before = std::fs::read(&db).unwrap();

        let mut options = RunOptions::new(RunMode::DryRun, &db);
        options.ambiguity_policy = AmbiguityPolicy::ApplyPartial;
        let outcome = Pipeline::new(options).reconcile(&ReconcileInputs::default()).unwrap();

        assert_eq!(outcome.summary().state, RunState::DryRunReport);
        assert_eq!(std::fs::read(&db).unwrap(), before);
        assert!(!outcome.summary().db_changed());
    }
}
