//! Tabular source readers (CSV and spreadsheet workbooks).

use crate::error::{CatalogError, Result};
use calamine::{open_workbook_auto, Reader};
use csv::ReaderBuilder;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Sheet selector for workbook sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetRef {
    Index(usize),
    Name(String),
}

impl SheetRef {
    /// Numeric input selects by zero-based index, anything else by name.
    pub fn parse(value: &str) -> Self {
        match value.trim().parse::<usize>() {
            Ok(index) => SheetRef::Index(index),
            Err(_) => SheetRef::Name(value.trim().to_string()),
        }
    }
}

impl fmt::Display for SheetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SheetRef::Index(i) => write!(f, "#{}", i),
            SheetRef::Name(n) => f.write_str(n),
        }
    }
}

/// Supported source formats, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    Tsv,
    Workbook,
}

impl SourceFormat {
    pub fn detect(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "csv" | "txt" => Ok(SourceFormat::Csv),
            "tsv" => Ok(SourceFormat::Tsv),
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Ok(SourceFormat::Workbook),
            _ => Err(CatalogError::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

/// One data row with its 1-based line number in the source (header = 1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow {
    pub row_number: usize,
    pub cells: Vec<String>,
}

/// Raw header + rows of a source file.
#[derive(Debug, Clone)]
pub struct SourceTable {
    pub path: PathBuf,
    pub headers: Vec<String>,
    pub rows: Vec<TableRow>,
}

/// Read a source table. `limit` caps the data rows read.
pub fn read_table(path: &Path, sheet: Option<&SheetRef>, limit: Option<usize>) -> Result<SourceTable> {
    if !path.exists() {
        return Err(CatalogError::FileNotFound(path.to_path_buf()));
    }
    let table = match SourceFormat::detect(path)? {
        SourceFormat::Csv => read_delimited(path, b',', limit)?,
        SourceFormat::Tsv => read_delimited(path, b'\t', limit)?,
        SourceFormat::Workbook => read_workbook(path, sheet, limit)?,
    };
    debug!(
        "Read {} rows ({} columns) from {}",
        table.rows.len(),
        table.headers.len(),
        path.display()
    );
    Ok(table)
}

fn read_delimited(path: &Path, delimiter: u8, limit: Option<usize>) -> Result<SourceTable> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| CatalogError::csv_with_path(e, path))?;

    let headers: Vec<String> = rdr
        .headers()
        .map_err(|e| CatalogError::csv_with_path(e, path))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for (idx, record) in rdr.records().enumerate() {
        if limit.is_some_and(|cap| rows.len() >= cap) {
            break;
        }
        let record = record.map_err(|e| CatalogError::csv_with_path(e, path))?;
        rows.push(TableRow {
            row_number: idx + 2,
            cells: record.iter().map(str::to_string).collect(),
        });
    }

    Ok(SourceTable {
        path: path.to_path_buf(),
        headers,
        rows,
    })
}

fn read_workbook(path: &Path, sheet: Option<&SheetRef>, limit: Option<usize>) -> Result<SourceTable> {
    let mut workbook = open_workbook_auto(path).map_err(|e| CatalogError::Spreadsheet {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let names = workbook.sheet_names();
    let selected = match sheet.unwrap_or(&SheetRef::Index(0)) {
        SheetRef::Index(i) => names.get(*i).cloned(),
        SheetRef::Name(n) => names.iter().find(|s| s.eq_ignore_ascii_case(n)).cloned(),
    };
    let Some(sheet_name) = selected else {
        return Err(CatalogError::InvalidSheet {
            sheet: sheet
                .map(ToString::to_string)
                .unwrap_or_else(|| "#0".to_string()),
            path: path.to_path_buf(),
            available: names.join(", "),
        });
    };

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| CatalogError::Spreadsheet {
            path: path.to_path_buf(),
            message: format!("sheet '{}': {}", sheet_name, e),
        })?;

    let mut sheet_rows = range.rows();
    let headers: Vec<String> = sheet_rows
        .next()
        .map(|cells| cells.iter().map(|c| c.to_string().trim().to_string()).collect())
        .unwrap_or_default();

    let mut rows = Vec::new();
    for (idx, cells) in sheet_rows.enumerate() {
        if limit.is_some_and(|cap| rows.len() >= cap) {
            break;
        }
        let cells: Vec<String> = cells.iter().map(|c| c.to_string().trim().to_string()).collect();
        if cells.iter().all(String::is_empty) {
            continue;
        }
        rows.push(TableRow {
            row_number: idx + 2,
            cells,
        });
    }

    debug!("Using sheet '{}' of {}", sheet_name, path.display());
    Ok(SourceTable {
        path: path.to_path_buf(),
        headers,
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sheet_ref_parse() {
        assert_eq!(SheetRef::parse("2"), SheetRef::Index(2));
        assert_eq!(SheetRef::parse(" Exercises "), SheetRef::Name("Exercises".into()));
    }

    #[test]
    fn test_detect_format() {
        assert_eq!(SourceFormat::detect(Path::new("a.CSV")).unwrap(), SourceFormat::Csv);
        assert_eq!(
            SourceFormat::detect(Path::new("a.xlsx")).unwrap(),
            SourceFormat::Workbook
        );
        assert!(matches!(
            SourceFormat::detect(Path::new("a.json")),
            Err(CatalogError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_read_csv_with_limit() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rows.csv");
        std::fs::write(
            &path,
            "exercise_name,force\nBench Press, push \nSquat,push\nRow,pull\n",
        )
        .unwrap();

        let table = read_table(&path, None, Some(2)).unwrap();
        assert_eq!(table.headers, vec!["exercise_name", "force"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].row_number, 2);
        assert_eq!(table.rows[0].cells, vec!["Bench Press", "push"]);
    }

    #[test]
    fn test_read_missing_file() {
        let err = read_table(Path::new("/nonexistent/rows.csv"), None, None).unwrap_err();
        assert!(matches!(err, CatalogError::FileNotFound(_)));
        assert!(err.is_input_error());
    }
}
