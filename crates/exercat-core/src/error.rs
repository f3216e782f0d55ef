//! Error types for the exercise catalog engine.
//!
//! Pure functions (normalization, staging, planning) never produce these; they
//! degrade to "absent" or a Title-Cased pass-through instead. Everything that
//! touches a file or the catalog store returns [`CatalogError`].

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the catalog engine.
#[derive(Debug, Error)]
pub enum CatalogError {
    // Database errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Backup of {path} failed: {message}")]
    BackupFailed {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    // Source input errors
    #[error("CSV error in {path}: {message}")]
    Csv {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<csv::Error>,
    },

    #[error("Spreadsheet error in {path}: {message}")]
    Spreadsheet { path: PathBuf, message: String },

    #[error("Unsupported source format: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("Required column '{column}' missing from {path}")]
    MissingColumn { column: String, path: PathBuf },

    #[error("Sheet '{sheet}' not found in {path} (available: {available})")]
    InvalidSheet {
        sheet: String,
        path: PathBuf,
        available: String,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Validation errors
    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Self-test failed: {message}")]
    SelfTest { message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;

impl From<std::io::Error> for CatalogError {
    fn from(err: std::io::Error) -> Self {
        CatalogError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for CatalogError {
    fn from(err: serde_json::Error) -> Self {
        CatalogError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<csv::Error> for CatalogError {
    fn from(err: csv::Error) -> Self {
        CatalogError::Csv {
            path: PathBuf::new(),
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<calamine::Error> for CatalogError {
    fn from(err: calamine::Error) -> Self {
        CatalogError::Spreadsheet {
            path: PathBuf::new(),
            message: err.to_string(),
        }
    }
}

impl From<rusqlite::Error> for CatalogError {
    fn from(err: rusqlite::Error) -> Self {
        CatalogError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl CatalogError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        CatalogError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create a CSV error with path context.
    pub fn csv_with_path(err: csv::Error, path: impl Into<PathBuf>) -> Self {
        CatalogError::Csv {
            path: path.into(),
            message: err.to_string(),
            source: Some(err),
        }
    }

    /// Input errors abort a run before the store is touched.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            CatalogError::FileNotFound(_)
                | CatalogError::Csv { .. }
                | CatalogError::Spreadsheet { .. }
                | CatalogError::UnsupportedFormat(_)
                | CatalogError::MissingColumn { .. }
                | CatalogError::InvalidSheet { .. }
        )
    }

    /// Check if this error should trigger a retry of the store transaction.
    ///
    /// Only SQLite busy/locked conditions qualify; the catalog is a shared
    /// local file and another process may briefly hold the write lock.
    pub fn is_retryable(&self) -> bool {
        match self {
            CatalogError::Database {
                source: Some(rusqlite::Error::SqliteFailure(err, _)),
                ..
            } => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }

    /// Convert to a process exit code.
    ///
    /// - 1: store or unexpected failure
    /// - 2: input error (bad source file, missing column, bad sheet)
    /// - 4: self-test assertion failure
    ///
    /// Code 3 (identity conflicts) is produced from
    /// [`MergeOutcome::DuplicatesFound`](crate::pipeline::MergeOutcome) and
    /// never from an error value.
    pub fn exit_code(&self) -> i32 {
        if self.is_input_error() {
            return 2;
        }
        match self {
            CatalogError::SelfTest { .. } => 4,
            _ => 1,
        }
    }

    /// Render the error together with its full `source()` chain.
    pub fn trace(&self) -> String {
        let mut out = self.to_string();
        let mut current = std::error::Error::source(self);
        while let Some(cause) = current {
            out.push_str("\n  caused by: ");
            out.push_str(&cause.to_string());
            current = cause.source();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CatalogError::MissingColumn {
            column: "exercise_name".into(),
            path: PathBuf::from("rows.csv"),
        };
        assert_eq!(
            err.to_string(),
            "Required column 'exercise_name' missing from rows.csv"
        );
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(CatalogError::FileNotFound("x.csv".into()).exit_code(), 2);
        assert_eq!(
            CatalogError::SelfTest {
                message: "boom".into()
            }
            .exit_code(),
            4
        );
        assert_eq!(CatalogError::Other("boom".into()).exit_code(), 1);
    }

    #[test]
    fn test_busy_is_retryable() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(CatalogError::from(busy).is_retryable());
        assert!(!CatalogError::Other("nope".into()).is_retryable());
    }

    #[test]
    fn test_trace_includes_source_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = CatalogError::BackupFailed {
            path: PathBuf::from("catalog.db"),
            message: "copy failed".into(),
            source: Some(io),
        };
        let trace = err.trace();
        assert!(trace.starts_with("Backup of catalog.db failed"));
        assert!(trace.contains("caused by: denied"));
    }
}
