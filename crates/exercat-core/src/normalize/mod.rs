//! Canonical vocabulary mapping for exercise metadata.
//!
//! Every ingestion path (bulk merge, spreadsheet import, backfill sweep,
//! reconciliation) goes through one [`Normalizer`], so they all converge on
//! the same spellings and exact-match de-duplication works downstream.
//!
//! Every method is pure and total. Unmapped values never error: muscles and
//! equipment pass through Title-Cased, the other classification fields pass
//! through as the cleaned original.

pub mod text;
pub mod vocabulary;

pub use text::{
    collapse_spaces, normalize_list_field, normalize_scalar_value, normalized_key, split_csv,
};
pub use vocabulary::{ShoulderRefinement, Vocabulary};

use crate::models::{ExerciseFields, ListColumn, ScalarColumn};
use text::{dedupe_case_insensitive, lookup_key, split_muscles, title_case};

/// Join format for multi-token muscle values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuscleJoin {
    Semicolon,
    Comma,
}

impl MuscleJoin {
    fn separator(&self) -> &'static str {
        match self {
            MuscleJoin::Semicolon => "; ",
            MuscleJoin::Comma => ", ",
        }
    }
}

/// Applies a [`Vocabulary`] to raw values.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    vocab: Vocabulary,
}

impl Normalizer {
    pub fn new(vocab: Vocabulary) -> Self {
        Self { vocab }
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocab
    }

    /// Map each muscle token through the group synonym table, Title-Case the
    /// unmapped ones, de-duplicate and re-join.
    pub fn canonicalize_muscles(&self, value: Option<&str>, join: MuscleJoin) -> Option<String> {
        let tokens = self.muscle_tokens(value?);
        if tokens.is_empty() {
            None
        } else {
            Some(tokens.join(join.separator()))
        }
    }

    /// Canonical muscle-group label(s) for one cell.
    pub fn normalize_muscle(&self, value: Option<&str>) -> Option<String> {
        self.canonicalize_muscles(value, MuscleJoin::Semicolon)
    }

    fn muscle_tokens(&self, value: &str) -> Vec<String> {
        let mapped = split_muscles(value).into_iter().map(|token| {
            self.vocab
                .muscle_synonyms
                .get(&lookup_key(&token))
                .cloned()
                .unwrap_or_else(|| title_case(&token))
        });
        dedupe_case_insensitive(mapped)
    }

    /// Map tokens into the granular isolated-muscle vocabulary. Unmapped
    /// tokens are Title-Cased so they stand out against the lowercase
    /// canonical set.
    pub fn canonicalize_isolated<S: AsRef<str>>(&self, tokens: &[S]) -> Vec<String> {
        let mapped = tokens
            .iter()
            .flat_map(|t| split_muscles(t.as_ref()))
            .map(|token| self.map_isolated_token(&token));
        dedupe_case_insensitive(mapped)
    }

    /// Canonical isolated-muscle token, or a Title-Cased pass-through.
    pub fn map_isolated_token(&self, token: &str) -> String {
        self.vocab
            .isolated_synonyms
            .get(&lookup_key(token))
            .cloned()
            .unwrap_or_else(|| title_case(token))
    }

    pub fn normalize_force(&self, value: Option<&str>) -> Option<String> {
        Self::resolve_closed(&self.vocab.force, value)
    }

    pub fn normalize_mechanic(&self, value: Option<&str>) -> Option<String> {
        Self::resolve_closed(&self.vocab.mechanic, value)
    }

    pub fn normalize_utility(&self, value: Option<&str>) -> Option<String> {
        Self::resolve_closed(&self.vocab.utility, value)
    }

    pub fn normalize_difficulty(&self, value: Option<&str>) -> Option<String> {
        Self::resolve_closed(&self.vocab.difficulty, value)
    }

    /// Resolve equipment. Anything mentioning "smith" is the Smith machine,
    /// even when it also says "machine".
    pub fn normalize_equipment(&self, value: Option<&str>) -> Option<String> {
        let cleaned = normalize_scalar_value(value)?;
        let key = lookup_key(&cleaned);
        if key.contains("smith") {
            return Some(self.vocab.smith_machine.clone());
        }
        Some(
            self.vocab
                .equipment
                .get(&key)
                .cloned()
                .unwrap_or_else(|| title_case(&cleaned)),
        )
    }

    fn resolve_closed(
        table: &std::collections::BTreeMap<String, String>,
        value: Option<&str>,
    ) -> Option<String> {
        let cleaned = normalize_scalar_value(value)?;
        Some(table.get(&lookup_key(&cleaned)).cloned().unwrap_or(cleaned))
    }

    /// Normalize one scalar column according to its kind.
    pub fn normalize_scalar(&self, column: ScalarColumn, value: Option<&str>) -> Option<String> {
        match column {
            ScalarColumn::PrimaryMuscleGroup
            | ScalarColumn::SecondaryMuscleGroup
            | ScalarColumn::TertiaryMuscleGroup => self.normalize_muscle(value),
            ScalarColumn::Utility => self.normalize_utility(value),
            ScalarColumn::Force => self.normalize_force(value),
            ScalarColumn::Equipment => self.normalize_equipment(value),
            ScalarColumn::Mechanic => self.normalize_mechanic(value),
            ScalarColumn::Difficulty => self.normalize_difficulty(value),
        }
    }

    /// Normalize one list column's tokens according to its kind.
    pub fn normalize_list<S: AsRef<str>>(&self, column: ListColumn, tokens: &[S]) -> Vec<String> {
        match column {
            ListColumn::AdvancedIsolatedMuscles => self.canonicalize_isolated(tokens),
            _ => {
                let joined = tokens
                    .iter()
                    .map(|t| t.as_ref())
                    .collect::<Vec<_>>()
                    .join(";");
                normalize_list_field(Some(&joined))
            }
        }
    }

    /// Canonical form of a whole row, ready for comparison or persistence.
    pub fn normalize_exercise_row(&self, fields: &ExerciseFields) -> ExerciseFields {
        let mut out = ExerciseFields::default();
        for column in ScalarColumn::ALL {
            out.set_scalar(column, self.normalize_scalar(column, fields.scalar(column)));
        }
        for column in ListColumn::ALL {
            out.set_list(column, self.normalize_list(column, fields.list(column)));
        }
        out
    }
}
