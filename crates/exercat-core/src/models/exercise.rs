//! Typed exercise catalog rows.
//!
//! Rows are converted into [`ExerciseFields`] once at the I/O boundary (source
//! reader, catalog store); everything downstream addresses columns through
//! [`ScalarColumn`] and [`ListColumn`] instead of string keys.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::normalize::text::{dedupe_case_insensitive, split_list_tokens};

/// Single-valued classification columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarColumn {
    PrimaryMuscleGroup,
    SecondaryMuscleGroup,
    TertiaryMuscleGroup,
    Utility,
    Force,
    Equipment,
    Mechanic,
    Difficulty,
}

impl ScalarColumn {
    pub const ALL: [ScalarColumn; 8] = [
        ScalarColumn::PrimaryMuscleGroup,
        ScalarColumn::SecondaryMuscleGroup,
        ScalarColumn::TertiaryMuscleGroup,
        ScalarColumn::Utility,
        ScalarColumn::Force,
        ScalarColumn::Equipment,
        ScalarColumn::Mechanic,
        ScalarColumn::Difficulty,
    ];

    /// The PST trio, in slot order.
    pub const MUSCLE_GROUPS: [ScalarColumn; 3] = [
        ScalarColumn::PrimaryMuscleGroup,
        ScalarColumn::SecondaryMuscleGroup,
        ScalarColumn::TertiaryMuscleGroup,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScalarColumn::PrimaryMuscleGroup => "primary_muscle_group",
            ScalarColumn::SecondaryMuscleGroup => "secondary_muscle_group",
            ScalarColumn::TertiaryMuscleGroup => "tertiary_muscle_group",
            ScalarColumn::Utility => "utility",
            ScalarColumn::Force => "force",
            ScalarColumn::Equipment => "equipment",
            ScalarColumn::Mechanic => "mechanic",
            ScalarColumn::Difficulty => "difficulty",
        }
    }

    pub fn is_muscle_group(&self) -> bool {
        Self::MUSCLE_GROUPS.contains(self)
    }
}

/// Multi-valued columns, stored as a joined string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListColumn {
    AdvancedIsolatedMuscles,
    Grips,
    Stabilizers,
    Synergists,
}

impl ListColumn {
    pub const ALL: [ListColumn; 4] = [
        ListColumn::AdvancedIsolatedMuscles,
        ListColumn::Grips,
        ListColumn::Stabilizers,
        ListColumn::Synergists,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ListColumn::AdvancedIsolatedMuscles => "advanced_isolated_muscles",
            ListColumn::Grips => "grips",
            ListColumn::Stabilizers => "stabilizers",
            ListColumn::Synergists => "synergists",
        }
    }

    /// Join separator used on write. The isolated-muscle field is read by the
    /// analytics layer as a comma-joined string.
    pub fn separator(&self) -> &'static str {
        match self {
            ListColumn::AdvancedIsolatedMuscles => ", ",
            _ => "; ",
        }
    }

    /// Split a stored value into tokens (either separator is accepted).
    pub fn parse(&self, stored: Option<&str>) -> Vec<String> {
        stored.map(split_list_tokens).unwrap_or_default()
    }

    /// Format tokens for persistence: case-insensitive de-duplication, then
    /// case-insensitive alphabetical order. Empty input is stored as NULL.
    pub fn format(&self, tokens: &[String]) -> Option<String> {
        let mut unique = dedupe_case_insensitive(tokens.iter().cloned());
        if unique.is_empty() {
            return None;
        }
        unique.sort_by(|a, b| {
            a.to_lowercase()
                .cmp(&b.to_lowercase())
                .then_with(|| a.cmp(b))
        });
        Some(unique.join(self.separator()))
    }
}

/// Any catalog column other than the identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Column {
    Scalar(ScalarColumn),
    List(ListColumn),
}

impl Column {
    pub fn as_str(&self) -> &'static str {
        match self {
            Column::Scalar(c) => c.as_str(),
            Column::List(c) => c.as_str(),
        }
    }

    /// Every column in table order.
    pub fn all() -> impl Iterator<Item = Column> {
        ScalarColumn::ALL
            .into_iter()
            .map(Column::Scalar)
            .chain(ListColumn::ALL.into_iter().map(Column::List))
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-column values of one exercise, absent columns as `None` / empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExerciseFields {
    pub primary_muscle_group: Option<String>,
    pub secondary_muscle_group: Option<String>,
    pub tertiary_muscle_group: Option<String>,
    pub advanced_isolated_muscles: Vec<String>,
    pub utility: Option<String>,
    pub grips: Vec<String>,
    pub stabilizers: Vec<String>,
    pub synergists: Vec<String>,
    pub force: Option<String>,
    pub equipment: Option<String>,
    pub mechanic: Option<String>,
    pub difficulty: Option<String>,
}

impl ExerciseFields {
    pub fn scalar(&self, column: ScalarColumn) -> Option<&str> {
        match column {
            ScalarColumn::PrimaryMuscleGroup => self.primary_muscle_group.as_deref(),
            ScalarColumn::SecondaryMuscleGroup => self.secondary_muscle_group.as_deref(),
            ScalarColumn::TertiaryMuscleGroup => self.tertiary_muscle_group.as_deref(),
            ScalarColumn::Utility => self.utility.as_deref(),
            ScalarColumn::Force => self.force.as_deref(),
            ScalarColumn::Equipment => self.equipment.as_deref(),
            ScalarColumn::Mechanic => self.mechanic.as_deref(),
            ScalarColumn::Difficulty => self.difficulty.as_deref(),
        }
    }

    pub fn set_scalar(&mut self, column: ScalarColumn, value: Option<String>) {
        let slot = match column {
            ScalarColumn::PrimaryMuscleGroup => &mut self.primary_muscle_group,
            ScalarColumn::SecondaryMuscleGroup => &mut self.secondary_muscle_group,
            ScalarColumn::TertiaryMuscleGroup => &mut self.tertiary_muscle_group,
            ScalarColumn::Utility => &mut self.utility,
            ScalarColumn::Force => &mut self.force,
            ScalarColumn::Equipment => &mut self.equipment,
            ScalarColumn::Mechanic => &mut self.mechanic,
            ScalarColumn::Difficulty => &mut self.difficulty,
        };
        *slot = value;
    }

    pub fn list(&self, column: ListColumn) -> &[String] {
        match column {
            ListColumn::AdvancedIsolatedMuscles => &self.advanced_isolated_muscles,
            ListColumn::Grips => &self.grips,
            ListColumn::Stabilizers => &self.stabilizers,
            ListColumn::Synergists => &self.synergists,
        }
    }

    pub fn set_list(&mut self, column: ListColumn, tokens: Vec<String>) {
        let slot = match column {
            ListColumn::AdvancedIsolatedMuscles => &mut self.advanced_isolated_muscles,
            ListColumn::Grips => &mut self.grips,
            ListColumn::Stabilizers => &mut self.stabilizers,
            ListColumn::Synergists => &mut self.synergists,
        };
        *slot = tokens;
    }

    /// The value of `column` as it would be persisted.
    pub fn stored(&self, column: Column) -> Option<String> {
        match column {
            Column::Scalar(c) => self.scalar(c).map(str::to_string),
            Column::List(c) => c.format(self.list(c)),
        }
    }

    /// True when no column carries a value.
    pub fn is_empty(&self) -> bool {
        Column::all().all(|c| self.stored(c).is_none())
    }
}

/// One row of the `exercises` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExerciseRecord {
    pub exercise_name: String,
    #[serde(flatten)]
    pub fields: ExerciseFields,
}

impl ExerciseRecord {
    pub fn new(exercise_name: impl Into<String>) -> Self {
        Self {
            exercise_name: exercise_name.into(),
            fields: ExerciseFields::default(),
        }
    }

    pub fn with_scalar(mut self, column: ScalarColumn, value: &str) -> Self {
        self.fields.set_scalar(column, Some(value.to_string()));
        self
    }

    pub fn with_list(mut self, column: ListColumn, stored: &str) -> Self {
        self.fields.set_list(column, column.parse(Some(stored)));
        self
    }
}
