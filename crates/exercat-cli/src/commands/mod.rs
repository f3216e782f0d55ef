//! Subcommand handlers, one file per tool.

pub mod backfill;
pub mod merge;
pub mod reconcile;

pub use backfill::BackfillArgs;
pub use merge::MergeArgs;
pub use reconcile::ReconcileArgs;

use clap::{ArgGroup, Args};
use exercat_core::audit::RunSummary;
use exercat_core::{run_self_test, MergeOutcome, RunMode, RunOptions, SheetRef, SourceSpec, SourceTarget};
use std::path::PathBuf;

/// Options shared by every catalog tool.
#[derive(Args, Debug)]
#[command(group(ArgGroup::new("mode").required(true).args(["dry_run", "apply"])))]
pub struct RunArgs {
    /// Catalog database path
    #[arg(long, default_value = "exercise_catalog.db")]
    pub db: PathBuf,

    /// Plan and report only; the catalog is not touched
    #[arg(long)]
    pub dry_run: bool,

    /// Back up the catalog and commit the plan
    #[arg(long)]
    pub apply: bool,

    /// Cap on source rows read
    #[arg(long)]
    pub limit: Option<usize>,

    /// Case-insensitive exercise-name uniqueness
    #[arg(long)]
    pub nocase: bool,

    /// Explicit backup path (default: timestamped file next to the catalog)
    #[arg(long, value_name = "FILE")]
    pub backup: Option<PathBuf>,

    /// Write a per-row diff preview CSV
    #[arg(long, value_name = "FILE")]
    pub preview_csv: Option<PathBuf>,

    /// Write a Markdown preview report
    #[arg(long, value_name = "FILE")]
    pub preview_md: Option<PathBuf>,

    /// Write the conflicts report here
    #[arg(long, value_name = "FILE")]
    pub conflicts_md: Option<PathBuf>,

    /// Markdown audit log (default: exercat-runs.md next to the catalog)
    #[arg(long, value_name = "FILE")]
    pub audit_log: Option<PathBuf>,

    /// Append one summary row per run to this CSV
    #[arg(long, value_name = "FILE")]
    pub history_csv: Option<PathBuf>,

    /// Run PRAGMA optimize and VACUUM after commit
    #[arg(long)]
    pub optimize: bool,

    /// Vocabulary override (JSON, same shape as the built-in tables)
    #[arg(long, value_name = "FILE")]
    pub vocabulary: Option<PathBuf>,

    /// Extra source header alias, e.g. "Lift=exercise_name" (repeatable)
    #[arg(long = "alias", value_name = "HEADER=COLUMN", value_parser = parse_alias)]
    pub aliases: Vec<(String, SourceTarget)>,
}

fn parse_alias(value: &str) -> Result<(String, SourceTarget), String> {
    let (header, column) = value
        .split_once('=')
        .ok_or_else(|| format!("expected HEADER=COLUMN, got '{}'", value))?;
    let target = SourceTarget::from_column_name(column)
        .ok_or_else(|| format!("unknown catalog column '{}'", column.trim()))?;
    Ok((header.trim().to_string(), target))
}

impl RunArgs {
    pub fn options(&self) -> RunOptions {
        let mode = if self.apply { RunMode::Apply } else { RunMode::DryRun };
        let mut options = RunOptions::new(mode, &self.db);
        options.limit = self.limit;
        options.nocase = self.nocase;
        options.backup_path = self.backup.clone();
        options.preview_csv = self.preview_csv.clone();
        options.preview_md = self.preview_md.clone();
        options.conflicts_md = self.conflicts_md.clone();
        if let Some(audit_log) = &self.audit_log {
            options.audit_log = audit_log.clone();
        }
        options.history_csv = self.history_csv.clone();
        options.optimize = self.optimize;
        options.vocabulary = self.vocabulary.clone();
        options.column_aliases = self.aliases.clone();
        options
    }
}

pub fn source_spec(path: &std::path::Path, sheet: Option<&str>) -> SourceSpec {
    let spec = SourceSpec::new(path);
    match sheet {
        Some(sheet) => spec.with_sheet(SheetRef::parse(sheet)),
        None => spec,
    }
}

/// Print the outcome and map it to an exit code.
pub fn report(outcome: &MergeOutcome, json: bool) -> anyhow::Result<i32> {
    let summary = outcome.summary();
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
    } else {
        print_summary(summary);
        if let MergeOutcome::InputError { error, .. } = outcome {
            println!("Input error: {}", error);
        }
    }
    Ok(outcome.exit_code())
}

fn print_summary(summary: &RunSummary) {
    let c = &summary.counts;
    println!(
        "{} ({}) run {}: {}",
        summary.tool.as_str(),
        summary.mode.as_str(),
        summary.run_id,
        summary.state.as_str()
    );
    println!(
        "  rows: {} read, {} staged, {} skipped, {} collisions",
        c.csv_rows, c.staged_rows, c.skipped_rows, c.collisions
    );
    println!(
        "  plan: {} inserts, {} updates, {} no-ops, {} skipped, {} conflicts",
        c.inserts, c.updates, c.noops, c.skips, c.conflicts
    );
    if c.ambiguous_fields + c.missing_in_db + c.forbidden_dropped > 0 {
        println!(
            "  reconcile: {} ambiguous fields, {} missing in catalog, {} forbidden tokens dropped",
            c.ambiguous_fields, c.missing_in_db, c.forbidden_dropped
        );
    }
    if c.duplicate_groups > 0 {
        println!("  duplicates: {} identity groups", c.duplicate_groups);
    }
    if let Some(backup) = &summary.artifacts.backup {
        println!("  backup: {}", backup.display());
    }
    if let Some(log) = &summary.artifacts.audit_log {
        println!("  audit: {}", log.display());
    }
}

/// `--self-test`: exit 0 when every check passes, 4 otherwise.
pub fn self_test(json: bool) -> anyhow::Result<i32> {
    let report = run_self_test()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for check in &report.checks {
            println!("ok  {}", check);
        }
        println!("self-test passed ({} checks)", report.checks.len());
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(flatten)]
        run: RunArgs,
    }

    #[test]
    fn test_mode_is_required() {
        assert!(TestCli::try_parse_from(["t", "--db", "c.db"]).is_err());
    }

    #[test]
    fn test_modes_are_exclusive() {
        assert!(TestCli::try_parse_from(["t", "--dry-run", "--apply"]).is_err());
    }

    #[test]
    fn test_alias_flag_parsing() {
        let cli = TestCli::try_parse_from(["t", "--dry-run", "--alias", "Lift = exercise_name"]).unwrap();
        assert_eq!(
            cli.run.options().column_aliases,
            vec![("Lift".to_string(), SourceTarget::Identity)]
        );
        assert!(TestCli::try_parse_from(["t", "--dry-run", "--alias", "Lift"]).is_err());
        assert!(TestCli::try_parse_from(["t", "--dry-run", "--alias", "Lift=video_url"]).is_err());
    }

    #[test]
    fn test_options_from_args() {
        let cli = TestCli::try_parse_from([
            "t", "--db", "/data/c.db", "--apply", "--nocase", "--limit", "10", "--vocabulary", "v.json",
        ])
        .unwrap();
        let options = cli.run.options();
        assert_eq!(options.mode, RunMode::Apply);
        assert!(options.nocase);
        assert_eq!(options.limit, Some(10));
        assert_eq!(options.audit_log, PathBuf::from("/data/exercat-runs.md"));
        assert_eq!(options.vocabulary, Some(PathBuf::from("v.json")));
    }
}
