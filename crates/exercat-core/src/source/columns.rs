//! Source header aliases.
//!
//! Spreadsheets in the wild label the same column many ways ("Primary
//! Target", "Target", "primary_muscle_group"). A [`ColumnMap`] resolves a
//! header to the catalog column it feeds. Matching is case- and
//! punctuation-insensitive, so `exercise_name` and `Exercise Name` are the
//! same header.

use std::collections::BTreeMap;

use crate::models::{Column, ListColumn, ScalarColumn};
use crate::normalize::text::lookup_key;

/// Canonical header of the identity column.
pub const IDENTITY_COLUMN: &str = "exercise_name";

/// Where a source column's values go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceTarget {
    Identity,
    Scalar(ScalarColumn),
    List(ListColumn),
    /// Folded into `stabilizers` with each token qualified `Dynamic: `.
    DynamicStabilizers,
}

impl SourceTarget {
    /// Target named by a catalog column, `exercise_name` or
    /// `dynamic_stabilizers`.
    pub fn from_column_name(name: &str) -> Option<Self> {
        let key = lookup_key(name);
        if key == lookup_key(IDENTITY_COLUMN) {
            return Some(SourceTarget::Identity);
        }
        if key == lookup_key("dynamic_stabilizers") {
            return Some(SourceTarget::DynamicStabilizers);
        }
        Column::all()
            .find(|column| lookup_key(column.as_str()) == key)
            .map(|column| match column {
                Column::Scalar(c) => SourceTarget::Scalar(c),
                Column::List(c) => SourceTarget::List(c),
            })
    }
}

/// Header alias table.
#[derive(Debug, Clone)]
pub struct ColumnMap {
    aliases: BTreeMap<String, SourceTarget>,
}

const DEFAULT_ALIASES: &[(&str, SourceTarget)] = &[
    ("exercise_name", SourceTarget::Identity),
    ("exercise", SourceTarget::Identity),
    ("name", SourceTarget::Identity),
    ("primary_muscle_group", SourceTarget::Scalar(ScalarColumn::PrimaryMuscleGroup)),
    ("primary target", SourceTarget::Scalar(ScalarColumn::PrimaryMuscleGroup)),
    ("target", SourceTarget::Scalar(ScalarColumn::PrimaryMuscleGroup)),
    ("primary", SourceTarget::Scalar(ScalarColumn::PrimaryMuscleGroup)),
    ("primary muscle", SourceTarget::Scalar(ScalarColumn::PrimaryMuscleGroup)),
    ("secondary_muscle_group", SourceTarget::Scalar(ScalarColumn::SecondaryMuscleGroup)),
    ("secondary target", SourceTarget::Scalar(ScalarColumn::SecondaryMuscleGroup)),
    ("secondary", SourceTarget::Scalar(ScalarColumn::SecondaryMuscleGroup)),
    ("secondary muscle", SourceTarget::Scalar(ScalarColumn::SecondaryMuscleGroup)),
    ("tertiary_muscle_group", SourceTarget::Scalar(ScalarColumn::TertiaryMuscleGroup)),
    ("tertiary target", SourceTarget::Scalar(ScalarColumn::TertiaryMuscleGroup)),
    ("tertiary", SourceTarget::Scalar(ScalarColumn::TertiaryMuscleGroup)),
    ("tertiary muscle", SourceTarget::Scalar(ScalarColumn::TertiaryMuscleGroup)),
    ("advanced_isolated_muscles", SourceTarget::List(ListColumn::AdvancedIsolatedMuscles)),
    ("isolated muscles", SourceTarget::List(ListColumn::AdvancedIsolatedMuscles)),
    ("advanced muscles", SourceTarget::List(ListColumn::AdvancedIsolatedMuscles)),
    ("target muscles advanced", SourceTarget::List(ListColumn::AdvancedIsolatedMuscles)),
    ("utility", SourceTarget::Scalar(ScalarColumn::Utility)),
    ("grips", SourceTarget::List(ListColumn::Grips)),
    ("grip", SourceTarget::List(ListColumn::Grips)),
    ("stabilizers", SourceTarget::List(ListColumn::Stabilizers)),
    ("stabilizer", SourceTarget::List(ListColumn::Stabilizers)),
    ("dynamic stabilizers", SourceTarget::DynamicStabilizers),
    ("synergists", SourceTarget::List(ListColumn::Synergists)),
    ("synergist", SourceTarget::List(ListColumn::Synergists)),
    ("force", SourceTarget::Scalar(ScalarColumn::Force)),
    ("force type", SourceTarget::Scalar(ScalarColumn::Force)),
    ("equipment", SourceTarget::Scalar(ScalarColumn::Equipment)),
    ("mechanic", SourceTarget::Scalar(ScalarColumn::Mechanic)),
    ("mechanics", SourceTarget::Scalar(ScalarColumn::Mechanic)),
    ("difficulty", SourceTarget::Scalar(ScalarColumn::Difficulty)),
    ("level", SourceTarget::Scalar(ScalarColumn::Difficulty)),
];

impl Default for ColumnMap {
    fn default() -> Self {
        let mut map = ColumnMap {
            aliases: BTreeMap::new(),
        };
        for (alias, target) in DEFAULT_ALIASES {
            map.aliases.insert(lookup_key(alias), *target);
        }
        map
    }
}

impl ColumnMap {
    /// Add or replace an alias.
    pub fn with_alias(mut self, alias: &str, target: SourceTarget) -> Self {
        self.aliases.insert(lookup_key(alias), target);
        self
    }

    /// Target column for a source header, if the header is known.
    pub fn resolve(&self, header: &str) -> Option<SourceTarget> {
        self.aliases.get(&lookup_key(header)).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_aliases_share_a_target() {
        let map = ColumnMap::default();
        let primary = Some(SourceTarget::Scalar(ScalarColumn::PrimaryMuscleGroup));
        assert_eq!(map.resolve("Primary Target"), primary);
        assert_eq!(map.resolve("Target"), primary);
        assert_eq!(map.resolve("primary_muscle_group"), primary);
    }

    #[test]
    fn test_identity_header_variants() {
        let map = ColumnMap::default();
        assert_eq!(map.resolve("Exercise Name"), Some(SourceTarget::Identity));
        assert_eq!(map.resolve(" EXERCISE_NAME "), Some(SourceTarget::Identity));
    }

    #[test]
    fn test_dynamic_stabilizers_and_unknown() {
        let map = ColumnMap::default();
        assert_eq!(
            map.resolve("Dynamic Stabilizers"),
            Some(SourceTarget::DynamicStabilizers)
        );
        assert_eq!(map.resolve("video_url"), None);
    }

    #[test]
    fn test_custom_alias_extends_defaults() {
        let map = ColumnMap::default().with_alias("Lift", SourceTarget::Identity);
        assert_eq!(map.resolve("lift"), Some(SourceTarget::Identity));
        assert_eq!(map.resolve("exercise_name"), Some(SourceTarget::Identity));
    }

    #[test]
    fn test_target_from_column_name() {
        assert_eq!(
            SourceTarget::from_column_name("Exercise Name"),
            Some(SourceTarget::Identity)
        );
        assert_eq!(
            SourceTarget::from_column_name("force"),
            Some(SourceTarget::Scalar(ScalarColumn::Force))
        );
        assert_eq!(
            SourceTarget::from_column_name("advanced_isolated_muscles"),
            Some(SourceTarget::List(ListColumn::AdvancedIsolatedMuscles))
        );
        assert_eq!(SourceTarget::from_column_name("video_url"), None);
    }
}
