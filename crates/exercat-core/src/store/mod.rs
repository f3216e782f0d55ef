//! Catalog persistence: SQLite store, backups and busy retry.

pub mod backup;
pub mod catalog;
pub mod retry;

pub use backup::{backup_path_for, create_backup};
pub use catalog::{ApplyStats, Catalog, DuplicateGroup, SpotChecks};
pub use retry::{retry_blocking, RetryConfig, RetryStats};
