//! SQLite-backed exercise catalog.
//!
//! One `exercises` table keyed by `exercise_name`, plus the derived
//! `exercise_isolated_muscles(exercise_name, muscle)` mapping that mirrors
//! `advanced_isolated_muscles`. Every write goes through [`Catalog::apply`],
//! which runs in a single transaction and rebuilds the mapping before commit,
//! so the two tables never disagree.
//!
//! Read-only handles never create or touch the file; a dry run leaves the
//! catalog byte-for-byte unchanged.

use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension, Row};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::retry::{retry_blocking, RetryConfig};
use crate::config::StoreConfig;
use crate::error::{CatalogError, Result};
use crate::models::{Column, ExerciseFields, ExerciseRecord, ListColumn, ScalarColumn};
use crate::normalize::text::{collapse_spaces, normalized_key};
use crate::planner::{MergeAction, MergeDecision};

/// Catalog rows sharing one identity key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    pub key: String,
    pub names: Vec<String>,
}

/// Rows written by one [`Catalog::apply`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ApplyStats {
    pub inserted: usize,
    pub updated: usize,
    pub mapping_rows: usize,
    /// Transaction attempts, including busy retries.
    pub attempts: u32,
}

/// Audit-only queries run after commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SpotChecks {
    pub exercises: usize,
    pub mapping_rows: usize,
    pub missing_primary: usize,
    pub generic_shoulders: usize,
    pub distinct_isolated: usize,
}

/// Handle on the catalog store.
pub struct Catalog {
    conn: Connection,
    path: Option<PathBuf>,
    read_only: bool,
    retry: RetryConfig,
}

impl Catalog {
    /// Open for writing, creating the file and schema when absent.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| CatalogError::Io {
                    message: format!("Failed to create catalog directory: {}", parent.display()),
                    path: Some(parent.to_path_buf()),
                    source: Some(e),
                })?;
            }
        }

        let conn = Connection::open(db_path)?;
        Self::configure_connection(&conn)?;
        Self::ensure_schema(&conn)?;

        Ok(Self {
            conn,
            path: Some(db_path.to_path_buf()),
            read_only: false,
            retry: RetryConfig::default(),
        })
    }

    /// Open without write access. A missing file reads as an empty catalog.
    pub fn open_read_only(db_path: &Path) -> Result<Self> {
        let conn = if db_path.exists() {
            let conn = Connection::open_with_flags(
                db_path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            conn.busy_timeout(std::time::Duration::from_millis(
                StoreConfig::BUSY_TIMEOUT_MS as u64,
            ))?;
            conn
        } else {
            debug!("Catalog {} does not exist yet; reading as empty", db_path.display());
            let conn = Connection::open_in_memory()?;
            Self::ensure_schema(&conn)?;
            conn
        };

        Ok(Self {
            conn,
            path: Some(db_path.to_path_buf()),
            read_only: true,
            retry: RetryConfig::default(),
        })
    }

    /// In-memory catalog for tests and the self-test.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::ensure_schema(&conn)?;
        Ok(Self {
            conn,
            path: None,
            read_only: false,
            retry: RetryConfig::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    // Default rollback journal: the catalog stays a single file, so the
    // verbatim backup copy is complete.
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(&format!(
            "PRAGMA busy_timeout={};\n\
             PRAGMA synchronous=NORMAL;\n\
             PRAGMA temp_store=MEMORY;",
            StoreConfig::BUSY_TIMEOUT_MS,
        ))?;
        Ok(())
    }

    fn ensure_schema(conn: &Connection) -> Result<()> {
        let columns: Vec<String> = Column::all()
            .map(|c| format!("{} TEXT", c.as_str()))
            .collect();
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {exercises} (
                exercise_name TEXT PRIMARY KEY NOT NULL,
                {columns}
            );

            CREATE TABLE IF NOT EXISTS {map} (
                exercise_name TEXT NOT NULL,
                muscle TEXT NOT NULL,
                UNIQUE(exercise_name, muscle)
            );

            CREATE INDEX IF NOT EXISTS idx_{map}_muscle ON {map}(muscle);",
            exercises = StoreConfig::EXERCISES_TABLE,
            map = StoreConfig::MUSCLE_MAP_TABLE,
            columns = columns.join(",\n                "),
        ))?;

        // Older catalogs may predate some columns.
        let present = Self::table_columns(conn, StoreConfig::EXERCISES_TABLE)?;
        for column in Column::all() {
            if !present.iter().any(|p| p == column.as_str()) {
                info!("Adding missing column {} to catalog", column);
                conn.execute_batch(&format!(
                    "ALTER TABLE {} ADD COLUMN {} TEXT;",
                    StoreConfig::EXERCISES_TABLE,
                    column.as_str()
                ))?;
            }
        }
        Ok(())
    }

    fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
        let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
        let mut out = Vec::new();
        for name in names {
            out.push(name?);
        }
        Ok(out)
    }

    fn table_exists(&self, table: &str) -> Result<bool> {
        let found: Option<String> = self
            .conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![table],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn row_to_record(row: &Row) -> rusqlite::Result<ExerciseRecord> {
        let mut fields = ExerciseFields::default();
        for (i, column) in Column::all().enumerate() {
            let value: Option<String> = row.get(i + 1)?;
            match column {
                Column::Scalar(c) => {
                    fields.set_scalar(c, value.filter(|v| !v.trim().is_empty()))
                }
                Column::List(c) => fields.set_list(c, c.parse(value.as_deref())),
            }
        }
        Ok(ExerciseRecord {
            exercise_name: row.get(0)?,
            fields,
        })
    }

    /// Every catalog row, ordered by name.
    pub fn load_records(&self) -> Result<Vec<ExerciseRecord>> {
        if !self.table_exists(StoreConfig::EXERCISES_TABLE)? {
            return Ok(Vec::new());
        }
        // Read-only handles cannot migrate, so absent columns read as NULL.
        let present = Self::table_columns(&self.conn, StoreConfig::EXERCISES_TABLE)?;
        let select: Vec<String> = Column::all()
            .map(|c| {
                if present.iter().any(|p| p == c.as_str()) {
                    c.as_str().to_string()
                } else {
                    format!("NULL AS {}", c.as_str())
                }
            })
            .collect();

        let mut stmt = self.conn.prepare(&format!(
            "SELECT exercise_name, {} FROM {} ORDER BY exercise_name",
            select.join(", "),
            StoreConfig::EXERCISES_TABLE
        ))?;
        let rows = stmt.query_map([], Self::row_to_record)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        debug!("Loaded {} catalog rows", records.len());
        Ok(records)
    }

    pub fn count(&self) -> Result<usize> {
        if !self.table_exists(StoreConfig::EXERCISES_TABLE)? {
            return Ok(0);
        }
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", StoreConfig::EXERCISES_TABLE),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Catalog rows whose identity collides. With `nocase` names differing
    /// only by case collide too; otherwise only whitespace variants do.
    pub fn find_duplicates(&self, nocase: bool) -> Result<Vec<DuplicateGroup>> {
        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for record in self.load_records()? {
            let key = if nocase {
                normalized_key(&record.exercise_name)
            } else {
                collapse_spaces(&record.exercise_name)
            };
            groups.entry(key).or_default().push(record.exercise_name);
        }
        Ok(groups
            .into_iter()
            .filter(|(_, names)| names.len() > 1)
            .map(|(key, names)| DuplicateGroup { key, names })
            .collect())
    }

    /// Write every insert/update decision in one transaction and rebuild the
    /// muscle mapping before commit. Busy/locked failures retry the whole
    /// transaction; any other failure rolls back and propagates.
    pub fn apply(&mut self, decisions: &[MergeDecision], nocase: bool) -> Result<ApplyStats> {
        if self.read_only {
            return Err(CatalogError::Database {
                message: "Catalog opened read-only".to_string(),
                source: None,
            });
        }

        let retry = self.retry.clone();
        let conn = &mut self.conn;
        let (result, retry_stats) = retry_blocking(
            &retry,
            || Self::apply_once(conn, decisions, nocase),
            CatalogError::is_retryable,
        );
        if !retry_stats.success {
            warn!(
                "Apply gave up after {} attempt(s): {}",
                retry_stats.attempts,
                retry_stats.last_error.as_deref().unwrap_or("unknown error")
            );
        } else if retry_stats.attempts > 1 {
            info!(
                "Apply succeeded on attempt {} after {:?} of backoff",
                retry_stats.attempts, retry_stats.total_delay
            );
        }
        let mut stats = result?;
        stats.attempts = retry_stats.attempts;
        info!(
            "Committed {} inserts, {} updates ({} mapping rows)",
            stats.inserted, stats.updated, stats.mapping_rows
        );
        Ok(stats)
    }

    fn apply_once(conn: &mut Connection, decisions: &[MergeDecision], nocase: bool) -> Result<ApplyStats> {
        let tx = conn.transaction()?;
        let mut stats = ApplyStats::default();
        let names: Vec<&str> = Column::all().map(|c| c.as_str()).collect();

        {
            let placeholders: Vec<String> = (1..=names.len() + 1).map(|i| format!("?{}", i)).collect();
            let mut insert = tx.prepare(&format!(
                "INSERT INTO {} (exercise_name, {}) VALUES ({})",
                StoreConfig::EXERCISES_TABLE,
                names.join(", "),
                placeholders.join(", ")
            ))?;
            let assignments: Vec<String> = names
                .iter()
                .enumerate()
                .map(|(i, n)| format!("{} = ?{}", n, i + 2))
                .collect();
            let mut update = tx.prepare(&format!(
                "UPDATE {} SET {} WHERE exercise_name = ?1",
                StoreConfig::EXERCISES_TABLE,
                assignments.join(", ")
            ))?;

            for decision in decisions {
                let values: Vec<Option<String>> = std::iter::once(Some(decision.exercise_name.clone()))
                    .chain(Column::all().map(|c| decision.fields.stored(c)))
                    .collect();
                match decision.action {
                    MergeAction::Insert => {
                        insert.execute(params_from_iter(values.iter()))?;
                        stats.inserted += 1;
                    }
                    MergeAction::Update => {
                        let changed = update.execute(params_from_iter(values.iter()))?;
                        if changed == 0 {
                            return Err(CatalogError::Database {
                                message: format!(
                                    "Update target '{}' not found",
                                    decision.exercise_name
                                ),
                                source: None,
                            });
                        }
                        stats.updated += 1;
                    }
                    MergeAction::Noop | MergeAction::Skip => {}
                }
            }
        }

        stats.mapping_rows = Self::rebuild_mapping(&tx)?;
        if nocase {
            Self::create_nocase_index(&tx)?;
        }
        tx.commit()?;
        Ok(stats)
    }

    /// Delete-all then reinsert the mapping from the canonical field.
    fn rebuild_mapping(conn: &Connection) -> Result<usize> {
        conn.execute(&format!("DELETE FROM {}", StoreConfig::MUSCLE_MAP_TABLE), [])?;

        let mut select = conn.prepare(&format!(
            "SELECT exercise_name, advanced_isolated_muscles FROM {}
             WHERE advanced_isolated_muscles IS NOT NULL",
            StoreConfig::EXERCISES_TABLE
        ))?;
        let mut insert = conn.prepare(&format!(
            "INSERT OR IGNORE INTO {} (exercise_name, muscle) VALUES (?1, ?2)",
            StoreConfig::MUSCLE_MAP_TABLE
        ))?;

        let rows = select.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
        })?;
        let mut inserted = 0;
        for row in rows {
            let (name, stored) = row?;
            for muscle in ListColumn::AdvancedIsolatedMuscles.parse(stored.as_deref()) {
                inserted += insert.execute(params![name, muscle])?;
            }
        }
        debug!("Rebuilt muscle mapping with {} rows", inserted);
        Ok(inserted)
    }

    fn create_nocase_index(conn: &Connection) -> Result<()> {
        conn.execute_batch(&format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {}(exercise_name COLLATE NOCASE);",
            StoreConfig::NOCASE_INDEX,
            StoreConfig::EXERCISES_TABLE
        ))?;
        Ok(())
    }

    /// `PRAGMA optimize` and `VACUUM`. Runs outside any transaction.
    pub fn optimize(&self) -> Result<()> {
        self.conn.execute_batch("PRAGMA optimize;\nVACUUM;")?;
        info!("Optimized catalog store");
        Ok(())
    }

    /// Muscle mapping rows, as `(exercise_name, muscle)`.
    pub fn mapping_rows(&self) -> Result<Vec<(String, String)>> {
        if !self.table_exists(StoreConfig::MUSCLE_MAP_TABLE)? {
            return Ok(Vec::new());
        }
        let mut stmt = self.conn.prepare(&format!(
            "SELECT exercise_name, muscle FROM {} ORDER BY exercise_name, muscle",
            StoreConfig::MUSCLE_MAP_TABLE
        ))?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn spot_checks(&self) -> Result<SpotChecks> {
        if !self.table_exists(StoreConfig::EXERCISES_TABLE)? {
            return Ok(SpotChecks::default());
        }
        let count = |sql: String, param: Option<&str>| -> Result<usize> {
            let n: i64 = match param {
                Some(p) => self.conn.query_row(&sql, params![p], |row| row.get(0))?,
                None => self.conn.query_row(&sql, [], |row| row.get(0))?,
            };
            Ok(n as usize)
        };
        let table = StoreConfig::EXERCISES_TABLE;
        let map = StoreConfig::MUSCLE_MAP_TABLE;
        let primary = ScalarColumn::PrimaryMuscleGroup.as_str();

        Ok(SpotChecks {
            exercises: count(format!("SELECT COUNT(*) FROM {}", table), None)?,
            mapping_rows: count(format!("SELECT COUNT(*) FROM {}", map), None)?,
            missing_primary: count(
                format!(
                    "SELECT COUNT(*) FROM {} WHERE {} IS NULL OR TRIM({}) = ''",
                    table, primary, primary
                ),
                None,
            )?,
            generic_shoulders: count(
                format!(
                    "SELECT COUNT(*) FROM {} WHERE {} = ?1 COLLATE NOCASE",
                    table, primary
                ),
                Some("Shoulders"),
            )?,
            distinct_isolated: count(format!("SELECT COUNT(DISTINCT muscle) FROM {}", map), None)?,
        })
    }
}
