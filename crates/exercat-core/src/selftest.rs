//! Built-in end-to-end check against a throwaway catalog.

use serde::Serialize;
use tempfile::TempDir;
use tracing::info;

use crate::audit::{RunState, RunSummary, Tool};
use crate::config::{RunMode, RunOptions};
use crate::error::{CatalogError, Result};
use crate::pipeline::{MergeOutcome, Pipeline, SourceSpec};

const SAMPLE_CSV: &str = "\
Exercise,Primary Target,Secondary Target,Force,Equipment,Grips,Isolated Muscles
Barbell Back Squat,quads,glutes,push,barbell,overhand,\"rectus femoris, gluteus maximus\"
Lateral Raise,shoulders,,push,dumbbell,neutral,lateral deltoid
Seated Cable Row,lats,biceps,pull,cable,neutral,\"latissimus dorsi, biceps brachii\"
";

const SAMPLE_ROWS: usize = 3;

/// Phases the self-test passed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SelfTestReport {
    pub checks: Vec<String>,
}

fn check(report: &mut SelfTestReport, ok: bool, what: &str) -> Result<()> {
    if !ok {
        return Err(CatalogError::SelfTest {
            message: what.to_string(),
        });
    }
    info!("self-test ok: {}", what);
    report.checks.push(what.to_string());
    Ok(())
}

fn completed(outcome: MergeOutcome, phase: &str) -> Result<RunSummary> {
    match outcome {
        MergeOutcome::Completed(summary) => Ok(summary),
        other => Err(CatalogError::SelfTest {
            message: format!("{} ended in {}", phase, other.summary().state.as_str()),
        }),
    }
}

/// Stage a sample source, dry-run it, apply it twice and sweep the result.
pub fn run_self_test() -> Result<SelfTestReport> {
    let dir = TempDir::new()?;
    let db = dir.path().join("catalog.db");
    let source_path = dir.path().join("sample.csv");
    std::fs::write(&source_path, SAMPLE_CSV).map_err(|e| CatalogError::io_with_path(e, &source_path))?;
    let source = SourceSpec::new(&source_path);
    let mut report = SelfTestReport::default();

    let dry = completed(
        Pipeline::new(RunOptions::new(RunMode::DryRun, &db)).merge(&source, Tool::SelfTest)?,
        "dry run",
    )?;
    check(&mut report, dry.state == RunState::DryRunReport, "dry run stops at the report")?;
    check(&mut report, !db.exists(), "dry run leaves the catalog untouched")?;
    check(&mut report, dry.counts.inserts == SAMPLE_ROWS, "dry run plans every insert")?;

    let apply = Pipeline::new(RunOptions::new(RunMode::Apply, &db));
    let first = completed(apply.merge(&source, Tool::SelfTest)?, "first apply")?;
    check(&mut report, first.state == RunState::Committed, "apply commits")?;
    check(&mut report, first.counts.inserts == SAMPLE_ROWS, "apply inserts every row")?;
    check(
        &mut report,
        first.counts.mapping_rows > 0,
        "isolated muscle mapping rebuilt",
    )?;

    let second = completed(apply.merge(&source, Tool::SelfTest)?, "second apply")?;
    check(
        &mut report,
        second.counts.inserts == 0 && second.counts.updates == 0,
        "second apply changes nothing",
    )?;
    check(&mut report, second.artifacts.backup.is_some(), "second apply backs up the catalog")?;

    let sweep = completed(
        Pipeline::new(RunOptions::new(RunMode::DryRun, &db)).backfill()?,
        "backfill",
    )?;
    check(&mut report, sweep.counts.updates == 0, "catalog already canonical")?;

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_test_passes() {
        let report = run_self_test().unwrap();
        assert_eq!(report.checks.len(), 9);
    }

    #[test]
    fn test_failed_check_is_self_test_error() {
        let mut report = SelfTestReport::default();
        let err = check(&mut report, false, "broken").unwrap_err();
        assert_eq!(err.exit_code(), 4);
        assert!(report.checks.is_empty());
    }
}
