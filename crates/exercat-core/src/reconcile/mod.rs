//! Three-source muscle reconciliation.
//!
//! For every catalog row, each muscle field takes its candidate from the first
//! source with a value, in [`SourceName::PRECEDENCE`] order (merge preview,
//! MuscleWiki export, then the catalog itself). When the catalog's own value
//! is the candidate the field is left as stored; canonicalizing stored values
//! is the backfill sweep's job. External candidates are resolved against the
//! vocabulary, and a field that cannot be resolved deterministically is
//! written to the curation list and never guessed.
//!
//! The isolated-muscle field is resolved first because the generic shoulder
//! label is refined from its deltoid tokens. An isolated value made only of
//! group labels is not a candidate, and an ambiguous isolated value gives no
//! shoulder evidence.
//!
//! Reconciliation replaces field values by precedence instead of merging
//! them, and it never inserts: rows that only exist in an external source are
//! reported as missing.

pub mod muscles;
pub mod sources;

pub use muscles::{
    refine_shoulder, resolve_isolated, resolve_pst, AmbiguityReason, IsolatedResolution,
    PstResolution,
};
pub use sources::{pick_first_present, ExternalSources, SourceName};

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::config::AmbiguityPolicy;
use crate::models::{Column, ExerciseRecord, ListColumn, ScalarColumn};
use crate::normalize::text::normalized_key;
use crate::normalize::Normalizer;
use crate::planner::{CatalogIndex, FieldChange, MergeAction, MergeDecision, MergePlan};

/// One ambiguous field routed to manual review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurationEntry {
    pub exercise_name: String,
    pub field: Column,
    pub source: SourceName,
    pub source_value: String,
    pub mapped_value: Option<String>,
    pub reason: AmbiguityReason,
}

/// A row found in an external source but not in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingRow {
    pub exercise_name: String,
    pub source: SourceName,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileCounts {
    pub rows_examined: usize,
    pub rows_changed: usize,
    pub fields_changed: usize,
    pub ambiguous_fields: usize,
    pub rows_skipped_ambiguous: usize,
    pub forbidden_dropped: usize,
    pub missing_in_db: usize,
}

/// Result of a reconciliation pass. The plan holds one decision per catalog
/// row; only `Update` decisions are written.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Reconciliation {
    pub plan: MergePlan,
    pub curation: Vec<CurationEntry>,
    pub missing_in_db: Vec<MissingRow>,
    pub counts: ReconcileCounts,
}

/// Reconciles catalog muscle fields against ranked external sources.
pub struct Reconciler<'a> {
    normalizer: &'a Normalizer,
    policy: AmbiguityPolicy,
}

struct RowOutcome {
    decision: MergeDecision,
    curation: Vec<CurationEntry>,
    forbidden_dropped: usize,
}

impl<'a> Reconciler<'a> {
    pub fn new(normalizer: &'a Normalizer, policy: AmbiguityPolicy) -> Self {
        Self { normalizer, policy }
    }

    pub fn reconcile(&self, catalog: &[ExerciseRecord], sources: &ExternalSources) -> Reconciliation {
        let mut out = Reconciliation::default();

        for record in catalog {
            let row = self.reconcile_row(record, sources);
            let counts = &mut out.counts;
            counts.rows_examined += 1;
            counts.forbidden_dropped += row.forbidden_dropped;
            counts.ambiguous_fields += row.curation.len();
            match row.decision.action {
                MergeAction::Update => {
                    counts.rows_changed += 1;
                    counts.fields_changed += row.decision.changes.len();
                    out.plan.counts.updates += 1;
                }
                MergeAction::Skip => {
                    counts.rows_skipped_ambiguous += 1;
                    out.plan.counts.skips += 1;
                }
                _ => out.plan.counts.noops += 1,
            }
            out.plan.counts.columns_filled += row.decision.columns_filled;
            out.plan.counts.lists_extended += row.decision.lists_extended;
            out.curation.extend(row.curation);
            out.plan.decisions.push(row.decision);
        }

        out.missing_in_db = self.missing_in_catalog(catalog, sources);
        out.counts.missing_in_db = out.missing_in_db.len();

        if out.counts.ambiguous_fields > 0 {
            warn!(
                "{} ambiguous field(s) routed to curation ({} row(s) skipped)",
                out.counts.ambiguous_fields, out.counts.rows_skipped_ambiguous
            );
        }
        debug!(
            "Reconciled {} rows: {} changed, {} missing in catalog",
            out.counts.rows_examined, out.counts.rows_changed, out.counts.missing_in_db
        );
        out
    }

    fn reconcile_row(&self, record: &ExerciseRecord, sources: &ExternalSources) -> RowOutcome {
        let key = normalized_key(&record.exercise_name);
        let mut fields = record.fields.clone();
        let mut changes = Vec::new();
        let mut curation = Vec::new();
        let mut forbidden_dropped = 0;

        let isolated = ListColumn::AdvancedIsolatedMuscles;
        let isolated_col = Column::List(isolated);
        let mut evidence = Vec::new();
        let candidates = sources
            .ranked_values(&key, isolated_col, &record.fields)
            .into_iter()
            .filter_map(|(source, value)| value.filter(|v| !v.trim().is_empty()).map(|v| (source, v)));
        for (source, value) in candidates {
            let resolution = resolve_isolated(self.normalizer, &value);
            if source == SourceName::Database {
                // The stored value is kept; it only feeds shoulder refinement.
                if !resolution.is_ambiguous() {
                    evidence = resolution.tokens;
                }
                break;
            }
            if !resolution.forbidden.is_empty() {
                forbidden_dropped += resolution.forbidden.len();
                debug!(
                    "Dropped group labels from {} isolated muscles ({}): {}",
                    record.exercise_name,
                    source,
                    resolution.forbidden.join(", ")
                );
            }
            if resolution.is_ambiguous() {
                curation.push(CurationEntry {
                    exercise_name: record.exercise_name.clone(),
                    field: isolated_col,
                    source,
                    source_value: value.clone(),
                    mapped_value: isolated.format(&resolution.tokens),
                    reason: AmbiguityReason::UnmappedIsolatedToken,
                });
                break;
            }
            if resolution.tokens.is_empty() {
                continue;
            }
            let old = record.fields.stored(isolated_col);
            let new = isolated.format(&resolution.tokens);
            if old != new {
                fields.set_list(isolated, resolution.tokens.clone());
                changes.push(FieldChange {
                    column: isolated_col,
                    old,
                    new,
                });
            }
            evidence = resolution.tokens;
            break;
        }

        for column in ScalarColumn::MUSCLE_GROUPS {
            let col = Column::Scalar(column);
            let Some((source, value)) = pick_first_present(sources.ranked_values(&key, col, &record.fields))
            else {
                continue;
            };
            if source == SourceName::Database {
                continue;
            }
            match resolve_pst(self.normalizer, &value, &evidence) {
                PstResolution::Absent => {}
                PstResolution::Resolved(label) => {
                    let old = record.fields.scalar(column);
                    if old != Some(label.as_str()) {
                        changes.push(FieldChange {
                            column: col,
                            old: old.map(str::to_string),
                            new: Some(label.clone()),
                        });
                        fields.set_scalar(column, Some(label));
                    }
                }
                PstResolution::Ambiguous { mapped, reason } => curation.push(CurationEntry {
                    exercise_name: record.exercise_name.clone(),
                    field: col,
                    source,
                    source_value: value,
                    mapped_value: mapped,
                    reason,
                }),
            }
        }

        let mut notes: Vec<String> = curation
            .iter()
            .map(|c| format!("{} ambiguous ({})", c.field, c.reason))
            .collect();

        let skip_row = !curation.is_empty() && self.policy == AmbiguityPolicy::SkipRow;
        let action = if skip_row {
            notes.push("skipped: ambiguous fields".to_string());
            changes.clear();
            fields = record.fields.clone();
            MergeAction::Skip
        } else if changes.is_empty() {
            MergeAction::Noop
        } else {
            MergeAction::Update
        };

        let columns_filled = changes
            .iter()
            .filter(|c| c.old.is_none() && matches!(c.column, Column::Scalar(_)))
            .count();
        let lists_extended = changes
            .iter()
            .filter(|c| matches!(c.column, Column::List(_)))
            .count();

        RowOutcome {
            decision: MergeDecision {
                key,
                exercise_name: record.exercise_name.clone(),
                action,
                fields,
                changes,
                conflicts: Vec::new(),
                notes,
                columns_filled,
                columns_already: 0,
                lists_extended,
            },
            curation,
            forbidden_dropped,
        }
    }

    fn missing_in_catalog(&self, catalog: &[ExerciseRecord], sources: &ExternalSources) -> Vec<MissingRow> {
        let index = CatalogIndex::new(catalog);
        let mut missing: BTreeMap<String, MissingRow> = BTreeMap::new();
        for (source, staged) in sources.iter() {
            for record in &staged.records {
                if index.contains(&record.key) {
                    continue;
                }
                missing.entry(record.key.clone()).or_insert_with(|| MissingRow {
                    exercise_name: record.display_name.clone(),
                    source,
                });
            }
        }
        missing.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::RawRow;
    use crate::staging::{stage, StageResult};

    fn staged(normalizer: &Normalizer, rows: &[RawRow]) -> StageResult {
        stage(rows, normalizer)
    }

    fn preview(n: &Normalizer, row: RawRow) -> ExternalSources {
        ExternalSources {
            merge_preview: Some(staged(n, &[row])),
            ..Default::default()
        }
    }

    #[test]
    fn test_catalog_values_left_untouched_without_sources() {
        let n = Normalizer::default();
        let catalog = vec![ExerciseRecord::new("Curl")
            .with_scalar(ScalarColumn::PrimaryMuscleGroup, "bicep")
            .with_list(ListColumn::AdvancedIsolatedMuscles, "biceps long head")];
        let result = Reconciler::new(&n, AmbiguityPolicy::SkipRow)
            .reconcile(&catalog, &ExternalSources::default());

        let decision = &result.plan.decisions[0];
        assert_eq!(decision.action, MergeAction::Noop);
        assert_eq!(decision.fields, catalog[0].fields);
        assert!(result.curation.is_empty());
    }

    #[test]
    fn test_ambiguous_catalog_value_does_not_block_source_fields() {
        let n = Normalizer::default();
        let catalog = vec![ExerciseRecord::new("Arnold Press")
            .with_scalar(ScalarColumn::PrimaryMuscleGroup, "Shoulders")];
        let sources = preview(
            &n,
            RawRow::named(2, "Arnold Press").with_scalar(ScalarColumn::SecondaryMuscleGroup, "triceps"),
        );
        let result = Reconciler::new(&n, AmbiguityPolicy::SkipRow).reconcile(&catalog, &sources);

        let decision = &result.plan.decisions[0];
        assert_eq!(decision.action, MergeAction::Update);
        assert_eq!(decision.fields.primary_muscle_group.as_deref(), Some("Shoulders"));
        assert_eq!(decision.fields.secondary_muscle_group.as_deref(), Some("Triceps"));
        assert!(result.curation.is_empty());
    }

    #[test]
    fn test_source_shoulder_refined_from_catalog_evidence() {
        let n = Normalizer::default();
        let catalog = vec![ExerciseRecord::new("Lateral Raise")
            .with_list(ListColumn::AdvancedIsolatedMuscles, "lateral-deltoid")];
        let sources = preview(
            &n,
            RawRow::named(2, "Lateral Raise").with_scalar(ScalarColumn::PrimaryMuscleGroup, "Shoulders"),
        );
        let result = Reconciler::new(&n, AmbiguityPolicy::SkipRow).reconcile(&catalog, &sources);

        let decision = &result.plan.decisions[0];
        assert_eq!(decision.action, MergeAction::Update);
        assert_eq!(decision.fields.primary_muscle_group.as_deref(), Some("Middle-Shoulder"));
        assert_eq!(decision.changes.len(), 1);
        assert!(result.curation.is_empty());
    }

    #[test]
    fn test_ambiguous_shoulder_skips_row_by_default() {
        let n = Normalizer::default();
        let catalog = vec![ExerciseRecord::new("Arnold Press")
            .with_scalar(ScalarColumn::SecondaryMuscleGroup, "Chest")
            .with_list(
                ListColumn::AdvancedIsolatedMuscles,
                "anterior-deltoid, lateral-deltoid",
            )];
        let sources = preview(
            &n,
            RawRow::named(2, "Arnold Press")
                .with_scalar(ScalarColumn::PrimaryMuscleGroup, "shoulders")
                .with_scalar(ScalarColumn::SecondaryMuscleGroup, "triceps"),
        );
        let result = Reconciler::new(&n, AmbiguityPolicy::SkipRow).reconcile(&catalog, &sources);

        let decision = &result.plan.decisions[0];
        assert_eq!(decision.action, MergeAction::Skip);
        assert!(decision.changes.is_empty());
        assert_eq!(decision.fields, catalog[0].fields);
        assert_eq!(result.counts.rows_skipped_ambiguous, 1);
        assert_eq!(result.curation.len(), 1);
        assert_eq!(result.curation[0].reason, AmbiguityReason::ShoulderMultipleDeltoids);
        assert_eq!(result.curation[0].source, SourceName::MergePreview);
    }

    #[test]
    fn test_apply_partial_omits_only_ambiguous_fields() {
        let n = Normalizer::default();
        let catalog = vec![ExerciseRecord::new("Arnold Press")
            .with_scalar(ScalarColumn::PrimaryMuscleGroup, "Front-Shoulder")];
        let sources = preview(
            &n,
            RawRow::named(2, "Arnold Press")
                .with_scalar(ScalarColumn::PrimaryMuscleGroup, "delts")
                .with_scalar(ScalarColumn::SecondaryMuscleGroup, "tricep"),
        );
        let result = Reconciler::new(&n, AmbiguityPolicy::ApplyPartial).reconcile(&catalog, &sources);

        let decision = &result.plan.decisions[0];
        assert_eq!(decision.action, MergeAction::Update);
        assert_eq!(decision.fields.primary_muscle_group.as_deref(), Some("Front-Shoulder"));
        assert_eq!(decision.fields.secondary_muscle_group.as_deref(), Some("Triceps"));
        assert_eq!(result.curation[0].reason, AmbiguityReason::ShoulderNoDeltoidEvidence);
    }

    #[test]
    fn test_group_labels_only_fall_through_to_next_source() {
        let n = Normalizer::default();
        let catalog = vec![ExerciseRecord::new("Incline Press")
            .with_list(ListColumn::AdvancedIsolatedMuscles, "upper-pectoralis, mid-lower-pectoralis")];
        let sources = ExternalSources {
            musclewiki: Some(staged(
                &n,
                &[RawRow::named(2, "Incline Press").with_list(ListColumn::AdvancedIsolatedMuscles, "Chest")],
            )),
            ..Default::default()
        };
        let result = Reconciler::new(&n, AmbiguityPolicy::SkipRow).reconcile(&catalog, &sources);

        let decision = &result.plan.decisions[0];
        assert_eq!(decision.action, MergeAction::Noop);
        assert_eq!(decision.fields, catalog[0].fields);
        assert_eq!(result.counts.forbidden_dropped, 1);

        let sources = ExternalSources {
            merge_preview: Some(staged(
                &n,
                &[RawRow::named(2, "Incline Press").with_list(ListColumn::AdvancedIsolatedMuscles, "chest")],
            )),
            musclewiki: Some(staged(
                &n,
                &[RawRow::named(2, "Incline Press")
                    .with_list(ListColumn::AdvancedIsolatedMuscles, "front delts")],
            )),
        };
        let result = Reconciler::new(&n, AmbiguityPolicy::SkipRow).reconcile(&catalog, &sources);
        assert_eq!(
            result.plan.decisions[0].fields.advanced_isolated_muscles,
            vec!["anterior-deltoid"]
        );
    }

    #[test]
    fn test_ambiguous_isolated_gives_no_shoulder_evidence() {
        let n = Normalizer::default();
        let catalog = vec![ExerciseRecord::new("Lateral Raise")];
        let sources = ExternalSources {
            musclewiki: Some(staged(
                &n,
                &[RawRow::named(2, "Lateral Raise")
                    .with_scalar(ScalarColumn::PrimaryMuscleGroup, "Shoulders")
                    .with_list(ListColumn::AdvancedIsolatedMuscles, "lateral-deltoid, mystery muscle")],
            )),
            ..Default::default()
        };
        let result = Reconciler::new(&n, AmbiguityPolicy::ApplyPartial).reconcile(&catalog, &sources);

        let reasons: Vec<AmbiguityReason> = result.curation.iter().map(|c| c.reason).collect();
        assert_eq!(
            reasons,
            vec![
                AmbiguityReason::UnmappedIsolatedToken,
                AmbiguityReason::ShoulderNoDeltoidEvidence
            ]
        );
        assert_eq!(result.plan.decisions[0].action, MergeAction::Noop);
    }

    #[test]
    fn test_source_precedence() {
        let n = Normalizer::default();
        let catalog = vec![ExerciseRecord::new("Dip").with_scalar(ScalarColumn::PrimaryMuscleGroup, "Biceps")];
        let sources = ExternalSources {
            merge_preview: Some(staged(
                &n,
                &[RawRow::named(2, "dip").with_scalar(ScalarColumn::PrimaryMuscleGroup, "chest")],
            )),
            musclewiki: Some(staged(
                &n,
                &[RawRow::named(2, "Dip").with_scalar(ScalarColumn::PrimaryMuscleGroup, "triceps")],
            )),
        };
        let result = Reconciler::new(&n, AmbiguityPolicy::SkipRow).reconcile(&catalog, &sources);
        assert_eq!(
            result.plan.decisions[0].fields.primary_muscle_group.as_deref(),
            Some("Chest")
        );
    }

    #[test]
    fn test_forbidden_tokens_dropped_and_counted() {
        let n = Normalizer::default();
        let catalog = vec![ExerciseRecord::new("Incline Press")];
        let sources = ExternalSources {
            musclewiki: Some(staged(
                &n,
                &[RawRow::named(2, "Incline Press")
                    .with_list(ListColumn::AdvancedIsolatedMuscles, "chest, upper chest")],
            )),
            ..Default::default()
        };
        let result = Reconciler::new(&n, AmbiguityPolicy::SkipRow).reconcile(&catalog, &sources);
        assert_eq!(result.counts.forbidden_dropped, 1);
        assert_eq!(
            result.plan.decisions[0].fields.advanced_isolated_muscles,
            vec!["upper-pectoralis"]
        );
    }

    #[test]
    fn test_unmapped_isolated_token_is_curated() {
        let n = Normalizer::default();
        let catalog = vec![ExerciseRecord::new("Curl")];
        let sources = ExternalSources {
            musclewiki: Some(staged(
                &n,
                &[RawRow::named(2, "Curl")
                    .with_list(ListColumn::AdvancedIsolatedMuscles, "brachioradialis")],
            )),
            ..Default::default()
        };
        let result = Reconciler::new(&n, AmbiguityPolicy::SkipRow).reconcile(&catalog, &sources);
        assert_eq!(result.curation.len(), 1);
        assert_eq!(result.curation[0].reason, AmbiguityReason::UnmappedIsolatedToken);
        assert_eq!(result.curation[0].source, SourceName::MuscleWiki);
        assert_eq!(result.plan.writes().count(), 0);
    }

    #[test]
    fn test_missing_in_catalog_reported_not_inserted() {
        let n = Normalizer::default();
        let sources = ExternalSources {
            merge_preview: Some(staged(&n, &[RawRow::named(2, "Nordic Curl")])),
            musclewiki: Some(staged(&n, &[RawRow::named(2, "nordic curl")])),
        };
        let result = Reconciler::new(&n, AmbiguityPolicy::SkipRow).reconcile(&[], &sources);
        assert_eq!(
            result.missing_in_db,
            vec![MissingRow {
                exercise_name: "Nordic Curl".into(),
                source: SourceName::MergePreview
            }]
        );
        assert!(result.plan.decisions.is_empty());
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let n = Normalizer::default();
        let catalog = vec![ExerciseRecord::new("Face Pull")];
        let sources = ExternalSources {
            musclewiki: Some(staged(
                &n,
                &[RawRow::named(2, "Face Pull")
                    .with_scalar(ScalarColumn::PrimaryMuscleGroup, "delts")
                    .with_list(ListColumn::AdvancedIsolatedMuscles, "rear delts, rhomboids")],
            )),
            ..Default::default()
        };
        let reconciler = Reconciler::new(&n, AmbiguityPolicy::SkipRow);
        let first = reconciler.reconcile(&catalog, &sources);
        let updated: Vec<ExerciseRecord> =
            first.plan.decisions.iter().map(MergeDecision::record).collect();
        assert_eq!(updated[0].fields.primary_muscle_group.as_deref(), Some("Rear-Shoulder"));

        let second = reconciler.reconcile(&updated, &sources);
        assert_eq!(second.counts.rows_changed, 0);
        assert_eq!(second.plan.counts.noops, 1);
    }
}
