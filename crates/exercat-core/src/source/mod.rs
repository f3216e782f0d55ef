//! Source ingestion: read a tabular file and map its headers onto catalog
//! columns.

pub mod columns;
pub mod reader;

pub use columns::{ColumnMap, SourceTarget, IDENTITY_COLUMN};
pub use reader::{read_table, SheetRef, SourceFormat, SourceTable, TableRow};

use crate::error::{CatalogError, Result};
use crate::models::{ListColumn, ScalarColumn};
use std::path::{Path, PathBuf};
use tracing::warn;

/// One source row after header mapping, values still raw.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRow {
    pub row_number: usize,
    pub exercise_name: Option<String>,
    pub scalars: Vec<(ScalarColumn, String)>,
    pub lists: Vec<(ListColumn, String)>,
    pub dynamic_stabilizers: Vec<String>,
}

impl RawRow {
    /// Convenience constructor for hand-built rows.
    pub fn named(row_number: usize, exercise_name: &str) -> Self {
        RawRow {
            row_number,
            exercise_name: Some(exercise_name.to_string()),
            ..Default::default()
        }
    }

    pub fn with_scalar(mut self, column: ScalarColumn, value: &str) -> Self {
        self.scalars.push((column, value.to_string()));
        self
    }

    pub fn with_list(mut self, column: ListColumn, value: &str) -> Self {
        self.lists.push((column, value.to_string()));
        self
    }
}

/// A mapped source file.
#[derive(Debug, Clone)]
pub struct SourceRows {
    pub path: PathBuf,
    pub rows: Vec<RawRow>,
    /// Headers no alias matched; their values are ignored.
    pub unmapped_headers: Vec<String>,
}

/// Map a raw table onto catalog columns.
///
/// Fails with [`CatalogError::MissingColumn`] when no header resolves to the
/// identity column.
pub fn map_table(table: SourceTable, columns: &ColumnMap) -> Result<SourceRows> {
    let targets: Vec<Option<SourceTarget>> =
        table.headers.iter().map(|h| columns.resolve(h)).collect();

    if !targets.contains(&Some(SourceTarget::Identity)) {
        return Err(CatalogError::MissingColumn {
            column: IDENTITY_COLUMN.to_string(),
            path: table.path,
        });
    }

    let unmapped_headers: Vec<String> = table
        .headers
        .iter()
        .zip(&targets)
        .filter(|(h, t)| t.is_none() && !h.trim().is_empty())
        .map(|(h, _)| h.clone())
        .collect();
    if !unmapped_headers.is_empty() {
        warn!(
            "Ignoring unmapped columns in {}: {}",
            table.path.display(),
            unmapped_headers.join(", ")
        );
    }

    let rows = table
        .rows
        .into_iter()
        .map(|row| {
            let mut raw = RawRow {
                row_number: row.row_number,
                ..Default::default()
            };
            for (cell, target) in row.cells.into_iter().zip(&targets) {
                match target {
                    Some(SourceTarget::Identity) => {
                        if raw.exercise_name.as_deref().map_or(true, |n| n.trim().is_empty()) {
                            raw.exercise_name = Some(cell);
                        }
                    }
                    Some(SourceTarget::Scalar(column)) => raw.scalars.push((*column, cell)),
                    Some(SourceTarget::List(column)) => raw.lists.push((*column, cell)),
                    Some(SourceTarget::DynamicStabilizers) => raw.dynamic_stabilizers.push(cell),
                    None => {}
                }
            }
            raw
        })
        .collect();

    Ok(SourceRows {
        path: table.path,
        rows,
        unmapped_headers,
    })
}

/// Read and map a source file in one step.
pub fn load_source(
    path: &Path,
    sheet: Option<&SheetRef>,
    columns: &ColumnMap,
    limit: Option<usize>,
) -> Result<SourceRows> {
    map_table(read_table(path, sheet, limit)?, columns)
}
