//! Merge planning: decide insert / update / no-op per staged record.
//!
//! Scalar columns are fill-only under [`ConflictPolicy::KeepExisting`]: an
//! absent catalog value is filled, an equal one is left alone, and a
//! different one is recorded as a conflict while the catalog value stays.
//! List columns only ever grow: the planned value is the case-insensitive
//! union of catalog and staged tokens.
//!
//! Planning is a pure function over already-normalized values.

use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

use crate::config::ConflictPolicy;
use crate::models::{Column, ExerciseFields, ExerciseRecord, ListColumn, ScalarColumn};
use crate::normalize::text::{dedupe_case_insensitive, normalized_key, values_equal};
use crate::staging::{StageResult, StagedRecord};

/// Planned action for one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeAction {
    Insert,
    Update,
    Noop,
    Skip,
}

impl MergeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeAction::Insert => "insert",
            MergeAction::Update => "update",
            MergeAction::Noop => "noop",
            MergeAction::Skip => "skip",
        }
    }
}

/// One column's planned change, in stored form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldChange {
    pub column: Column,
    pub old: Option<String>,
    pub new: Option<String>,
}

/// Which side a scalar conflict resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    KeptExisting,
    TookIncoming,
}

/// Both sides populated and different.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldConflict {
    pub exercise_name: String,
    pub column: ScalarColumn,
    pub existing: String,
    pub incoming: String,
    pub resolution: ConflictResolution,
}

/// The planned outcome for one staged record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeDecision {
    pub key: String,
    /// Catalog name for updates, staged display name for inserts.
    pub exercise_name: String,
    pub action: MergeAction,
    /// Full resulting field set.
    pub fields: ExerciseFields,
    pub changes: Vec<FieldChange>,
    pub conflicts: Vec<FieldConflict>,
    pub notes: Vec<String>,
    pub columns_filled: usize,
    pub columns_already: usize,
    pub lists_extended: usize,
}

impl MergeDecision {
    /// The record to persist for inserts and updates.
    pub fn record(&self) -> ExerciseRecord {
        ExerciseRecord {
            exercise_name: self.exercise_name.clone(),
            fields: self.fields.clone(),
        }
    }

    pub fn is_write(&self) -> bool {
        matches!(self.action, MergeAction::Insert | MergeAction::Update)
    }
}

/// Aggregate counts over a plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlanCounts {
    pub inserts: usize,
    pub updates: usize,
    pub noops: usize,
    pub skips: usize,
    pub conflicts: usize,
    pub columns_filled: usize,
    pub columns_already: usize,
    pub lists_extended: usize,
}

/// Decisions for a whole staging result.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MergePlan {
    pub decisions: Vec<MergeDecision>,
    pub counts: PlanCounts,
}

impl MergePlan {
    pub fn writes(&self) -> impl Iterator<Item = &MergeDecision> {
        self.decisions.iter().filter(|d| d.is_write())
    }

    pub fn conflicts(&self) -> impl Iterator<Item = &FieldConflict> {
        self.decisions.iter().flat_map(|d| d.conflicts.iter())
    }
}

/// Plans merges of staged records against catalog rows.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergePlanner {
    pub conflict_policy: ConflictPolicy,
    /// Unmatched staged records become `Skip` instead of `Insert`.
    pub update_only: bool,
}

impl MergePlanner {
    pub fn new(conflict_policy: ConflictPolicy, update_only: bool) -> Self {
        Self {
            conflict_policy,
            update_only,
        }
    }

    /// Plan one staged record against its catalog row, if any.
    pub fn plan(&self, existing: Option<&ExerciseRecord>, staged: &StagedRecord) -> MergeDecision {
        match existing {
            None if self.update_only => MergeDecision {
                key: staged.key.clone(),
                exercise_name: staged.display_name.clone(),
                action: MergeAction::Skip,
                fields: staged.fields.clone(),
                changes: Vec::new(),
                conflicts: Vec::new(),
                notes: vec!["not in catalog (update-only)".to_string()],
                columns_filled: 0,
                columns_already: 0,
                lists_extended: 0,
            },
            None => self.plan_insert(staged),
            Some(existing) => self.plan_update(existing, staged),
        }
    }

    fn plan_insert(&self, staged: &StagedRecord) -> MergeDecision {
        let changes = Column::all()
            .filter_map(|column| {
                staged.fields.stored(column).map(|new| FieldChange {
                    column,
                    old: None,
                    new: Some(new),
                })
            })
            .collect();
        let mut notes = Vec::new();
        if staged.source_names.len() > 1 {
            notes.push(format!("merged {} source spellings", staged.source_names.len()));
        }
        MergeDecision {
            key: staged.key.clone(),
            exercise_name: staged.display_name.clone(),
            action: MergeAction::Insert,
            fields: staged.fields.clone(),
            changes,
            conflicts: Vec::new(),
            notes,
            columns_filled: 0,
            columns_already: 0,
            lists_extended: 0,
        }
    }

    fn plan_update(&self, existing: &ExerciseRecord, staged: &StagedRecord) -> MergeDecision {
        let mut fields = existing.fields.clone();
        let mut decision = MergeDecision {
            key: staged.key.clone(),
            exercise_name: existing.exercise_name.clone(),
            action: MergeAction::Noop,
            fields: ExerciseFields::default(),
            changes: Vec::new(),
            conflicts: Vec::new(),
            notes: Vec::new(),
            columns_filled: 0,
            columns_already: 0,
            lists_extended: 0,
        };

        for column in ScalarColumn::ALL {
            let Some(incoming) = staged.fields.scalar(column) else {
                continue;
            };
            match existing.fields.scalar(column) {
                None => {
                    fields.set_scalar(column, Some(incoming.to_string()));
                    decision.columns_filled += 1;
                    decision.changes.push(FieldChange {
                        column: Column::Scalar(column),
                        old: None,
                        new: Some(incoming.to_string()),
                    });
                }
                Some(current) if values_equal(Some(current), Some(incoming)) => {
                    decision.columns_already += 1;
                }
                Some(current) => {
                    let resolution = match self.conflict_policy {
                        ConflictPolicy::KeepExisting => ConflictResolution::KeptExisting,
                        ConflictPolicy::PreferIncoming => {
                            fields.set_scalar(column, Some(incoming.to_string()));
                            decision.changes.push(FieldChange {
                                column: Column::Scalar(column),
                                old: Some(current.to_string()),
                                new: Some(incoming.to_string()),
                            });
                            ConflictResolution::TookIncoming
                        }
                    };
                    debug!(
                        "Conflict on {}.{}: '{}' vs '{}'",
                        existing.exercise_name,
                        column.as_str(),
                        current,
                        incoming
                    );
                    decision.conflicts.push(FieldConflict {
                        exercise_name: existing.exercise_name.clone(),
                        column,
                        existing: current.to_string(),
                        incoming: incoming.to_string(),
                        resolution,
                    });
                }
            }
        }

        for column in ListColumn::ALL {
            let incoming = staged.fields.list(column);
            if incoming.is_empty() {
                continue;
            }
            let current = existing.fields.list(column);
            let union = union_tokens(current, incoming);
            let before = column.format(current);
            let after = column.format(&union);
            if before == after {
                decision.columns_already += 1;
                continue;
            }
            decision.lists_extended += 1;
            decision.changes.push(FieldChange {
                column: Column::List(column),
                old: before,
                new: after,
            });
            fields.set_list(column, union);
        }

        if staged.source_names.len() > 1 {
            decision
                .notes
                .push(format!("merged {} source spellings", staged.source_names.len()));
        }
        if !decision.conflicts.is_empty() {
            decision
                .notes
                .push(format!("{} conflicting column(s)", decision.conflicts.len()));
        }
        if !decision.changes.is_empty() {
            decision.action = MergeAction::Update;
        }
        decision.fields = fields;
        decision
    }

    /// Plan every staged record against the catalog.
    pub fn plan_all(&self, catalog: &[ExerciseRecord], staged: &StageResult) -> MergePlan {
        let index = CatalogIndex::new(catalog);
        let mut plan = MergePlan::default();

        for record in &staged.records {
            let decision = self.plan(index.find(&record.key, &record.display_name), record);
            let counts = &mut plan.counts;
            match decision.action {
                MergeAction::Insert => counts.inserts += 1,
                MergeAction::Update => counts.updates += 1,
                MergeAction::Noop => counts.noops += 1,
                MergeAction::Skip => counts.skips += 1,
            }
            counts.conflicts += decision.conflicts.len();
            counts.columns_filled += decision.columns_filled;
            counts.columns_already += decision.columns_already;
            counts.lists_extended += decision.lists_extended;
            plan.decisions.push(decision);
        }

        debug!(
            "Planned {} inserts, {} updates, {} no-ops, {} skips",
            plan.counts.inserts, plan.counts.updates, plan.counts.noops, plan.counts.skips
        );
        plan
    }
}

/// Union of two token lists, catalog spelling first, case-insensitive.
pub fn union_tokens(existing: &[String], incoming: &[String]) -> Vec<String> {
    dedupe_case_insensitive(existing.iter().chain(incoming.iter()).cloned())
}

/// Catalog rows by identity key.
pub struct CatalogIndex<'a> {
    by_key: HashMap<String, Vec<&'a ExerciseRecord>>,
}

impl<'a> CatalogIndex<'a> {
    pub fn new(records: &'a [ExerciseRecord]) -> Self {
        let mut by_key: HashMap<String, Vec<&'a ExerciseRecord>> = HashMap::new();
        for record in records {
            by_key
                .entry(normalized_key(&record.exercise_name))
                .or_default()
                .push(record);
        }
        Self { by_key }
    }

    /// The catalog row for `key`, preferring an exact spelling match when
    /// case variants coexist.
    pub fn find(&self, key: &str, display_name: &str) -> Option<&'a ExerciseRecord> {
        let candidates = self.by_key.get(key)?;
        candidates
            .iter()
            .find(|r| r.exercise_name == display_name)
            .or_else(|| candidates.first())
            .copied()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.by_key.contains_key(key)
    }
}
