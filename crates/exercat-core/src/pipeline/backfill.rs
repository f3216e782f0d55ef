//! Normalization backfill over the whole catalog.

use tracing::{debug, info};

use crate::audit::{RunState, RunSummary, Tool};
use crate::error::Result;
use crate::models::{Column, ExerciseRecord};
use crate::normalize::text::normalized_key;
use crate::normalize::Normalizer;
use crate::planner::{FieldChange, MergeAction, MergeDecision, MergePlan};
use crate::store::Catalog;

use super::{MergeOutcome, Pipeline, Stop};

/// Plan rewriting every catalog row into canonical form.
///
/// Rows already canonical become `Noop`. Only the stored text of a column is
/// compared, so a list in a different order but with the same tokens is left
/// alone.
pub fn plan_sweep(normalizer: &Normalizer, records: &[ExerciseRecord]) -> MergePlan {
    let mut plan = MergePlan::default();
    for record in records {
        let fields = normalizer.normalize_exercise_row(&record.fields);
        let changes: Vec<FieldChange> = Column::all()
            .filter_map(|column| {
                let old = record.fields.stored(column);
                let new = fields.stored(column);
                (old != new).then_some(FieldChange { column, old, new })
            })
            .collect();

        let action = if changes.is_empty() {
            plan.counts.noops += 1;
            MergeAction::Noop
        } else {
            plan.counts.updates += 1;
            MergeAction::Update
        };
        plan.decisions.push(MergeDecision {
            key: normalized_key(&record.exercise_name),
            exercise_name: record.exercise_name.clone(),
            action,
            fields,
            changes,
            conflicts: Vec::new(),
            notes: Vec::new(),
            columns_filled: 0,
            columns_already: 0,
            lists_extended: 0,
        });
    }
    debug!("Sweep found {} rows to normalize", plan.counts.updates);
    plan
}

impl Pipeline {
    /// Rewrite existing catalog rows into canonical form.
    pub fn backfill(&self) -> Result<MergeOutcome> {
        let summary = RunSummary::new(Tool::Backfill, self.options.mode, &self.options.db_path);
        self.run_guarded(summary, |pipeline, summary| pipeline.backfill_body(summary))
    }

    fn backfill_body(&self, summary: &mut RunSummary) -> Result<Stop> {
        summary.db_hash_before = self.hash_catalog()?;

        super::transition(summary, RunState::Planning);
        let catalog = Catalog::open_read_only(&self.options.db_path)?;
        let records = catalog.load_records()?;
        drop(catalog);

        let plan = plan_sweep(&self.normalizer, &records);
        summary.record_plan(&plan);
        info!(
            "Backfill: {} of {} rows need normalization",
            plan.counts.updates,
            records.len()
        );

        self.write_previews(summary, &plan.decisions)?;
        self.execute(summary, &plan.decisions)?;
        Ok(Stop::Done)
    }
}
