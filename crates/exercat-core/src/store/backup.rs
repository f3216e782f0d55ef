//! Pre-apply catalog backups.

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::BackupConfig;
use crate::error::{CatalogError, Result};

/// Timestamped sibling path: `catalog.db` becomes
/// `catalog.backup-20240101-120000.db`.
pub fn backup_path_for(db_path: &Path, now: DateTime<Local>) -> PathBuf {
    let stem = db_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "catalog".to_string());
    let stamp = now.format(BackupConfig::TIMESTAMP_FORMAT);
    let name = match db_path.extension() {
        Some(ext) => format!(
            "{}.{}-{}.{}",
            stem,
            BackupConfig::SUFFIX,
            stamp,
            ext.to_string_lossy()
        ),
        None => format!("{}.{}-{}", stem, BackupConfig::SUFFIX, stamp),
    };
    db_path.with_file_name(name)
}

/// `path`, or `path` with a `-N` counter before the extension when taken.
fn first_free(path: PathBuf) -> PathBuf {
    if !path.exists() {
        return path;
    }
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path.extension().map(|e| e.to_string_lossy().into_owned());
    let mut n = 1;
    loop {
        let name = match &ext {
            Some(ext) => format!("{}-{}.{}", stem, n, ext),
            None => format!("{}-{}", stem, n),
        };
        let candidate = path.with_file_name(name);
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

/// Copy the catalog verbatim before any mutation.
///
/// Returns `None` when there is no catalog file yet. Any failure is a
/// [`CatalogError::BackupFailed`], which must abort the run.
pub fn create_backup(db_path: &Path, target: Option<&Path>) -> Result<Option<PathBuf>> {
    if !db_path.exists() {
        return Ok(None);
    }
    let target = match target {
        Some(path) => path.to_path_buf(),
        None => first_free(backup_path_for(db_path, Local::now())),
    };

    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| CatalogError::BackupFailed {
            path: db_path.to_path_buf(),
            message: format!("cannot create {}", parent.display()),
            source: Some(e),
        })?;
    }
    if target.exists() {
        return Err(CatalogError::BackupFailed {
            path: db_path.to_path_buf(),
            message: format!("{} already exists", target.display()),
            source: None,
        });
    }

    let bytes = std::fs::copy(db_path, &target).map_err(|e| CatalogError::BackupFailed {
        path: db_path.to_path_buf(),
        message: format!("copy to {} failed", target.display()),
        source: Some(e),
    })?;
    info!("Backed up {} ({} bytes) to {}", db_path.display(), bytes, target.display());
    Ok(Some(target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_backup_path_format() {
        let now = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(
            backup_path_for(Path::new("/data/catalog.db"), now),
            PathBuf::from("/data/catalog.backup-20240309-070501.db")
        );
        assert_eq!(
            backup_path_for(Path::new("/data/catalog"), now),
            PathBuf::from("/data/catalog.backup-20240309-070501")
        );
    }

    #[test]
    fn test_backup_copies_bytes() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("catalog.db");
        std::fs::write(&db, b"catalog bytes").unwrap();
        let target = dir.path().join("nested/copy.db");

        let made = create_backup(&db, Some(&target)).unwrap();
        assert_eq!(made.as_deref(), Some(target.as_path()));
        assert_eq!(std::fs::read(&target).unwrap(), b"catalog bytes");
    }

    #[test]
    fn test_no_backup_without_catalog() {
        let dir = TempDir::new().unwrap();
        let made = create_backup(&dir.path().join("missing.db"), None).unwrap();
        assert!(made.is_none());
    }

    #[test]
    fn test_default_backups_never_collide() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("catalog.db");
        std::fs::write(&db, b"x").unwrap();

        let first = create_backup(&db, None).unwrap().unwrap();
        let second = create_backup(&db, None).unwrap().unwrap();
        assert_ne!(first, second);
        assert!(first.exists() && second.exists());
    }

    #[test]
    fn test_existing_target_fails() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("catalog.db");
        std::fs::write(&db, b"x").unwrap();
        let target = dir.path().join("taken.db");
        std::fs::write(&target, b"y").unwrap();

        let err = create_backup(&db, Some(&target)).unwrap_err();
        assert!(matches!(err, CatalogError::BackupFailed { .. }));
        assert_eq!(std::fs::read(&target).unwrap(), b"y");
    }
}
