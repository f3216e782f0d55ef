//! Ranked reconciliation sources.

use serde::Serialize;
use std::fmt;

use crate::models::{Column, ExerciseFields};
use crate::staging::StageResult;

/// A named value source, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceName {
    /// Hand-edited merge preview.
    MergePreview,
    /// External MuscleWiki export.
    MuscleWiki,
    /// The catalog's current value.
    Database,
}

impl SourceName {
    pub const PRECEDENCE: [SourceName; 3] = [
        SourceName::MergePreview,
        SourceName::MuscleWiki,
        SourceName::Database,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceName::MergePreview => "merge_preview",
            SourceName::MuscleWiki => "musclewiki",
            SourceName::Database => "database",
        }
    }
}

impl fmt::Display for SourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// First source, in the given order, carrying a non-blank value.
pub fn pick_first_present<I, V>(sources: I) -> Option<(SourceName, V)>
where
    I: IntoIterator<Item = (SourceName, Option<V>)>,
    V: AsRef<str>,
{
    sources
        .into_iter()
        .find_map(|(name, value)| value.filter(|v| !v.as_ref().trim().is_empty()).map(|v| (name, v)))
}

/// The external sources of one reconciliation run.
#[derive(Debug, Clone, Default)]
pub struct ExternalSources {
    pub merge_preview: Option<StageResult>,
    pub musclewiki: Option<StageResult>,
}

impl ExternalSources {
    pub fn iter(&self) -> impl Iterator<Item = (SourceName, &StageResult)> {
        [
            (SourceName::MergePreview, self.merge_preview.as_ref()),
            (SourceName::MuscleWiki, self.musclewiki.as_ref()),
        ]
        .into_iter()
        .filter_map(|(name, staged)| staged.map(|s| (name, s)))
    }

    /// Stored values of `column` for `key`, in precedence order, ending with
    /// the catalog's own value.
    pub fn ranked_values(
        &self,
        key: &str,
        column: Column,
        database: &ExerciseFields,
    ) -> Vec<(SourceName, Option<String>)> {
        let external = |staged: Option<&StageResult>| {
            staged
                .and_then(|s| s.get(key))
                .and_then(|r| r.fields.stored(column))
        };
        vec![
            (SourceName::MergePreview, external(self.merge_preview.as_ref())),
            (SourceName::MuscleWiki, external(self.musclewiki.as_ref())),
            (SourceName::Database, database.stored(column)),
        ]
    }
}
