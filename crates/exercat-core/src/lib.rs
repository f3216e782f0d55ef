//! Exercat Core - exercise catalog normalization, merge and reconciliation.
//!
//! The catalog is a local SQLite database of exercises keyed by name. This
//! crate stages tabular sources (CSV, TSV, spreadsheet workbooks) into a
//! canonical vocabulary, plans fill-only merges against the catalog,
//! reconciles muscle fields across ranked sources and applies the result in
//! one transaction, with a backup beforehand and an append-only audit trail
//! afterwards.
//!
//! # Example
//!
//! ```rust,ignore
//! use exercat_core::{Pipeline, RunMode, RunOptions, SourceSpec, Tool};
//!
//! fn main() -> exercat_core::Result<()> {
//!     let options = RunOptions::new(RunMode::DryRun, "data/catalog.db");
//!     let outcome = Pipeline::new(options).merge(&SourceSpec::new("incoming.csv"), Tool::Merge)?;
//!
//!     let counts = &outcome.summary().counts;
//!     println!("{} inserts, {} updates planned", counts.inserts, counts.updates);
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod config;
pub mod error;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod planner;
pub mod reconcile;
pub mod selftest;
pub mod source;
pub mod staging;
pub mod store;

// Re-export commonly used types
pub use audit::{RunState, RunSummary, Tool};
pub use config::{AmbiguityPolicy, ConflictPolicy, RunMode, RunOptions};
pub use error::{CatalogError, Result};
pub use models::{Column, ExerciseFields, ExerciseRecord, ListColumn, ScalarColumn};
pub use normalize::{Normalizer, Vocabulary};
pub use pipeline::{MergeOutcome, Pipeline, ReconcileInputs, SourceSpec};
pub use planner::{MergeAction, MergePlan, MergePlanner};
pub use reconcile::Reconciler;
pub use selftest::{run_self_test, SelfTestReport};
pub use source::{ColumnMap, SheetRef, SourceTarget};
pub use store::Catalog;
