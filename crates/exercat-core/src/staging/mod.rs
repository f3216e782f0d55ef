//! Record staging: group source rows by identity key and merge duplicates.
//!
//! Within a group, scalar columns keep the first non-empty value seen and list
//! columns accumulate the union of every row's tokens. Muscle columns are
//! canonicalized once the group is complete; a muscle column that
//! canonicalizes to nothing is cleared.
//!
//! A key fed by more than one distinct raw spelling is reported as a
//! [`Collision`]. Collisions are expected for whitespace/case variants and are
//! surfaced only so an operator can spot a key that collapsed two different
//! exercises.

use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::models::{ExerciseFields, ListColumn, ScalarColumn};
use crate::normalize::text::{
    dedupe_case_insensitive, is_null_token, normalize_list_field, normalize_scalar_value,
    normalized_key, split_csv, with_dynamic_qualifier,
};
use crate::normalize::{MuscleJoin, Normalizer};
use crate::source::RawRow;

/// Source rows merged under one identity key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagedRecord {
    pub key: String,
    /// First cleaned spelling; used when inserting.
    pub display_name: String,
    /// Every distinct raw spelling that collapsed into this key.
    pub source_names: Vec<String>,
    pub row_numbers: Vec<usize>,
    pub fields: ExerciseFields,
}

/// A source row that was not staged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRow {
    pub row_number: usize,
    pub reason: String,
}

/// A key fed by more than one raw spelling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Collision {
    pub key: String,
    pub spellings: Vec<String>,
}

/// Output of [`stage`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct StageResult {
    /// Sorted case-insensitively by display name.
    pub records: Vec<StagedRecord>,
    /// Source rows read.
    pub csv_rows: usize,
    /// Source rows that contributed to a record.
    pub staged_rows: usize,
    pub skipped: Vec<SkippedRow>,
    pub collisions: Vec<Collision>,
}

impl StageResult {
    /// Look up a staged record by identity key.
    pub fn get(&self, key: &str) -> Option<&StagedRecord> {
        self.records.iter().find(|r| r.key == key)
    }
}

#[derive(Default)]
struct Group {
    display_name: String,
    source_names: Vec<String>,
    row_numbers: Vec<usize>,
    scalars: HashMap<ScalarColumn, String>,
    lists: HashMap<ListColumn, Vec<String>>,
}

impl Group {
    fn extend_list(&mut self, column: ListColumn, tokens: Vec<String>) {
        let entry = self.lists.entry(column).or_default();
        let merged = dedupe_case_insensitive(entry.drain(..).chain(tokens));
        *entry = merged;
    }
}

/// Group and merge raw rows into staged records.
pub fn stage(rows: &[RawRow], normalizer: &Normalizer) -> StageResult {
    let mut result = StageResult {
        csv_rows: rows.len(),
        ..Default::default()
    };
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Group> = HashMap::new();

    for row in rows {
        let raw_name = row.exercise_name.as_deref().unwrap_or("");
        let Some(name) = normalize_scalar_value(Some(raw_name)) else {
            result.skipped.push(SkippedRow {
                row_number: row.row_number,
                reason: "empty exercise_name".to_string(),
            });
            continue;
        };

        let key = normalized_key(&name);
        let group = groups.entry(key.clone()).or_insert_with(|| {
            order.push(key.clone());
            Group {
                display_name: name.clone(),
                ..Default::default()
            }
        });
        if !group.source_names.iter().any(|s| s == raw_name) {
            group.source_names.push(raw_name.to_string());
        }
        group.row_numbers.push(row.row_number);
        result.staged_rows += 1;

        for (column, value) in &row.scalars {
            if group.scalars.contains_key(column) {
                continue;
            }
            let Some(cleaned) = normalize_scalar_value(Some(value)).filter(|v| !is_null_token(v))
            else {
                continue;
            };
            // Muscle groups are canonicalized after grouping.
            let value = if column.is_muscle_group() {
                Some(cleaned)
            } else {
                normalizer.normalize_scalar(*column, Some(&cleaned))
            };
            if let Some(value) = value {
                group.scalars.insert(*column, value);
            }
        }

        for (column, value) in &row.lists {
            let tokens = match column {
                ListColumn::AdvancedIsolatedMuscles => split_csv(Some(value)),
                _ => normalize_list_field(Some(value)),
            };
            group.extend_list(*column, tokens);
        }

        for value in &row.dynamic_stabilizers {
            let tokens = split_csv(Some(value))
                .iter()
                .map(|t| with_dynamic_qualifier(t))
                .collect();
            group.extend_list(ListColumn::Stabilizers, tokens);
        }
    }

    for key in order {
        let Some(group) = groups.remove(&key) else {
            continue;
        };
        if group.source_names.len() > 1 {
            warn!(
                "Identity collision for '{}': {}",
                key,
                group.source_names.join(" | ")
            );
            result.collisions.push(Collision {
                key: key.clone(),
                spellings: group.source_names.clone(),
            });
        }
        result.records.push(finish_group(key, group, normalizer));
    }

    result
        .records
        .sort_by(|a, b| {
            a.display_name
                .to_lowercase()
                .cmp(&b.display_name.to_lowercase())
                .then_with(|| a.display_name.cmp(&b.display_name))
        });

    debug!(
        "Staged {} records from {} rows ({} skipped, {} collisions)",
        result.records.len(),
        result.csv_rows,
        result.skipped.len(),
        result.collisions.len()
    );
    result
}

fn finish_group(key: String, mut group: Group, normalizer: &Normalizer) -> StagedRecord {
    let mut fields = ExerciseFields::default();

    for column in ScalarColumn::ALL {
        let value = group.scalars.remove(&column);
        let value = if column.is_muscle_group() {
            normalizer.canonicalize_muscles(value.as_deref(), MuscleJoin::Semicolon)
        } else {
            value
        };
        fields.set_scalar(column, value);
    }

    for column in ListColumn::ALL {
        let tokens = group.lists.remove(&column).unwrap_or_default();
        let tokens = match column {
            ListColumn::AdvancedIsolatedMuscles => normalizer.canonicalize_isolated(&tokens),
            _ => tokens,
        };
        fields.set_list(column, tokens);
    }

    StagedRecord {
        key,
        display_name: group.display_name,
        source_names: group.source_names,
        row_numbers: group.row_numbers,
        fields,
    }
}
