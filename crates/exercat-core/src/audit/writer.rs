//! Audit trail and report writers.
//!
//! The Markdown run log and the history CSV are append-only: a run adds one
//! section or one row and never rewrites earlier content. Preview, conflict
//! and curation reports are per-run files and are replaced on each run.

use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use crate::config::AuditConfig;
use crate::error::{CatalogError, Result};
use crate::models::Column;
use crate::planner::{ConflictResolution, FieldConflict, MergeAction, MergeDecision};
use crate::reconcile::CurationEntry;
use crate::store::DuplicateGroup;

use super::report::RunSummary;

const LOG_HEADER: &str = "# exercat run log\n\n";

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| CatalogError::io_with_path(e, parent))?;
    }
    Ok(())
}

/// Report write failures are store-side I/O, not bad input.
fn write_error(err: csv::Error, path: &Path) -> CatalogError {
    match err.into_kind() {
        csv::ErrorKind::Io(e) => CatalogError::io_with_path(e, path),
        other => CatalogError::Other(format!("writing {} failed: {:?}", path.display(), other)),
    }
}

fn is_new_file(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true)
}

fn cell(value: Option<&str>) -> String {
    match value {
        Some(v) => v.replace('|', "\\|"),
        None => "(none)".to_string(),
    }
}

/// Render one run as a Markdown section.
pub fn render_markdown(summary: &RunSummary) -> String {
    let mut out = String::new();
    let c = &summary.counts;

    let _ = writeln!(
        out,
        "## {} {} ({})\n",
        summary.started_at,
        summary.tool.as_str(),
        summary.mode.as_str()
    );
    let _ = writeln!(out, "- run id: `{}`", summary.run_id);
    let _ = writeln!(out, "- state: {}", summary.state.as_str());
    if let Some(finished) = &summary.finished_at {
        let _ = writeln!(out, "- finished: {}", finished);
    }
    let _ = writeln!(out, "- catalog: `{}`", summary.db_path.display());
    for source in &summary.sources {
        let _ = writeln!(
            out,
            "- source: `{}` sha256 `{}`",
            source.path.display(),
            source.sha256.as_deref().unwrap_or("-")
        );
    }
    let _ = writeln!(
        out,
        "- catalog sha256 before: `{}`",
        summary.db_hash_before.as_deref().unwrap_or("-")
    );
    let _ = writeln!(
        out,
        "- catalog sha256 after: `{}`",
        summary.db_hash_after.as_deref().unwrap_or("-")
    );
    if let Some(backup) = &summary.artifacts.backup {
        let _ = writeln!(out, "- backup: `{}`", backup.display());
    }
    if summary.retry_attempts > 1 {
        let _ = writeln!(out, "- store attempts: {}", summary.retry_attempts);
    }

    let _ = writeln!(out, "\n### Counts\n");
    let _ = writeln!(out, "| metric | value |\n|---|---|");
    for (name, value) in [
        ("source rows", c.csv_rows),
        ("staged rows", c.staged_rows),
        ("skipped rows", c.skipped_rows),
        ("collisions", c.collisions),
        ("inserts", c.inserts),
        ("updates", c.updates),
        ("no-ops", c.noops),
        ("skips", c.skips),
        ("conflicts", c.conflicts),
        ("columns filled", c.columns_filled),
        ("columns already set", c.columns_already),
        ("lists extended", c.lists_extended),
        ("ambiguous fields", c.ambiguous_fields),
        ("forbidden tokens dropped", c.forbidden_dropped),
        ("missing in catalog", c.missing_in_db),
        ("duplicate groups", c.duplicate_groups),
        ("normalized after commit", c.normalized_after_commit),
        ("mapping rows", c.mapping_rows),
    ] {
        let _ = writeln!(out, "| {} | {} |", name, value);
    }

    if !summary.samples.is_empty() {
        let _ = writeln!(
            out,
            "\n### Sample changes (first {})\n",
            AuditConfig::SAMPLE_LIMIT
        );
        let _ = writeln!(out, "| exercise | action | column | old | new |\n|---|---|---|---|---|");
        for s in &summary.samples {
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} | {} |",
                cell(Some(&s.exercise_name)),
                s.action.as_str(),
                s.column,
                cell(s.old.as_deref()),
                cell(s.new.as_deref())
            );
        }
    }

    if !summary.conflicts.is_empty() {
        let _ = writeln!(
            out,
            "\n### Conflicts (first {})\n",
            AuditConfig::CONFLICT_LIMIT
        );
        push_conflict_table(&mut out, &summary.conflicts);
    }

    if !summary.duplicates.is_empty() {
        let _ = writeln!(out, "\n### Duplicate identities\n");
        push_duplicate_list(&mut out, &summary.duplicates);
    }

    if !summary.curation.is_empty() {
        let _ = writeln!(
            out,
            "\n### Ambiguous fields (first {})\n",
            AuditConfig::CURATION_LIMIT
        );
        let _ = writeln!(out, "| exercise | field | source | value | reason |\n|---|---|---|---|---|");
        for e in &summary.curation {
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} | {} |",
                cell(Some(&e.exercise_name)),
                e.field,
                e.source,
                cell(Some(&e.source_value)),
                e.reason
            );
        }
    }

    if !summary.missing_in_db.is_empty() {
        let _ = writeln!(out, "\n### Missing in catalog\n");
        for m in &summary.missing_in_db {
            let _ = writeln!(out, "- {} ({})", m.exercise_name, m.source);
        }
    }

    if let Some(checks) = &summary.spot_checks {
        let _ = writeln!(out, "\n### Spot checks\n");
        let _ = writeln!(out, "- exercises: {}", checks.exercises);
        let _ = writeln!(out, "- mapping rows: {}", checks.mapping_rows);
        let _ = writeln!(out, "- missing primary muscle: {}", checks.missing_primary);
        let _ = writeln!(out, "- generic Shoulders: {}", checks.generic_shoulders);
        let _ = writeln!(out, "- distinct isolated muscles: {}", checks.distinct_isolated);
    }

    if !summary.warnings.is_empty() {
        let _ = writeln!(out, "\n### Warnings\n");
        for w in &summary.warnings {
            let _ = writeln!(out, "- {}", w);
        }
    }

    if let Some(error) = &summary.error {
        let _ = writeln!(out, "\n### Error\n\n```text\n{}\n```", error);
    }

    out.push('\n');
    out
}

fn push_conflict_table(out: &mut String, conflicts: &[FieldConflict]) {
    let _ = writeln!(
        out,
        "| exercise | column | catalog | incoming | resolution |\n|---|---|---|---|---|"
    );
    for c in conflicts {
        let resolution = match c.resolution {
            ConflictResolution::KeptExisting => "kept catalog",
            ConflictResolution::TookIncoming => "took incoming",
        };
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | {} |",
            cell(Some(&c.exercise_name)),
            c.column.as_str(),
            cell(Some(&c.existing)),
            cell(Some(&c.incoming)),
            resolution
        );
    }
}

fn push_duplicate_list(out: &mut String, duplicates: &[DuplicateGroup]) {
    for group in duplicates {
        let names: Vec<String> = group.names.iter().map(|n| format!("`{}`", n)).collect();
        let _ = writeln!(out, "- `{}`: {}", group.key, names.join(", "));
    }
}

/// Append one run section to the Markdown log.
pub fn append_run_log(path: &Path, summary: &RunSummary) -> Result<()> {
    ensure_parent(path)?;
    let new_file = is_new_file(path);
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| CatalogError::io_with_path(e, path))?;

    let mut text = String::new();
    if new_file {
        text.push_str(LOG_HEADER);
    }
    text.push_str(&render_markdown(summary));
    // One write call per run keeps concurrent appends from interleaving.
    file.write_all(text.as_bytes())
        .map_err(|e| CatalogError::io_with_path(e, path))?;
    Ok(())
}

const HISTORY_HEADER: [&str; 18] = [
    "run_id",
    "started_at",
    "finished_at",
    "tool",
    "mode",
    "state",
    "db_path",
    "db_sha256_before",
    "db_sha256_after",
    "backup",
    "inserts",
    "updates",
    "noops",
    "skips",
    "conflicts",
    "columns_filled",
    "ambiguous_fields",
    "error",
];

/// Append one summary row to the history CSV, writing the header when the
/// file is new.
pub fn append_history_csv(path: &Path, summary: &RunSummary) -> Result<()> {
    ensure_parent(path)?;
    let new_file = is_new_file(path);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| CatalogError::io_with_path(e, path))?;

    let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(file);
    if new_file {
        wtr.write_record(HISTORY_HEADER)
            .map_err(|e| write_error(e, path))?;
    }
    let c = &summary.counts;
    let first_line = summary
        .error
        .as_deref()
        .and_then(|e| e.lines().next())
        .unwrap_or("");
    let row: Vec<String> = vec![
        summary.run_id.clone(),
        summary.started_at.clone(),
        summary.finished_at.clone().unwrap_or_default(),
        summary.tool.as_str().to_string(),
        summary.mode.as_str().to_string(),
        summary.state.as_str().to_string(),
        summary.db_path.display().to_string(),
        summary.db_hash_before.clone().unwrap_or_default(),
        summary.db_hash_after.clone().unwrap_or_default(),
        summary
            .artifacts
            .backup
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default(),
        c.inserts.to_string(),
        c.updates.to_string(),
        c.noops.to_string(),
        c.skips.to_string(),
        c.conflicts.to_string(),
        c.columns_filled.to_string(),
        c.ambiguous_fields.to_string(),
        first_line.to_string(),
    ];
    wtr.write_record(&row)
        .map_err(|e| write_error(e, path))?;
    wtr.flush().map_err(|e| CatalogError::io_with_path(e, path))?;
    Ok(())
}

/// Diff preview: `exercise_name, action, <column>_diff...`, one row per
/// decision that is not a no-op.
pub fn write_preview_csv(path: &Path, decisions: &[MergeDecision]) -> Result<()> {
    ensure_parent(path)?;
    let mut wtr = csv::Writer::from_path(path).map_err(|e| write_error(e, path))?;

    let mut header = vec!["exercise_name".to_string(), "action".to_string()];
    header.extend(Column::all().map(|c| format!("{}_diff", c.as_str())));
    wtr.write_record(&header)
        .map_err(|e| write_error(e, path))?;

    for decision in decisions.iter().filter(|d| d.action != MergeAction::Noop) {
        let mut record = vec![decision.exercise_name.clone(), decision.action.as_str().to_string()];
        for column in Column::all() {
            let diff = decision
                .changes
                .iter()
                .find(|c| c.column == column)
                .map(|c| {
                    format!(
                        "{} -> {}",
                        c.old.as_deref().unwrap_or(""),
                        c.new.as_deref().unwrap_or("")
                    )
                })
                .unwrap_or_default();
            record.push(diff);
        }
        wtr.write_record(&record)
            .map_err(|e| write_error(e, path))?;
    }
    wtr.flush().map_err(|e| CatalogError::io_with_path(e, path))?;
    Ok(())
}

/// Human-readable preview of every planned write.
pub fn write_preview_md(path: &Path, summary: &RunSummary, decisions: &[MergeDecision]) -> Result<()> {
    ensure_parent(path)?;
    let mut out = String::new();
    let _ = writeln!(
        out,
        "# {} preview ({})\n\n- catalog: `{}`\n- inserts: {}\n- updates: {}\n- skips: {}\n- conflicts: {}\n",
        summary.tool.as_str(),
        summary.mode.as_str(),
        summary.db_path.display(),
        summary.counts.inserts,
        summary.counts.updates,
        summary.counts.skips,
        summary.counts.conflicts
    );

    for decision in decisions.iter().filter(|d| d.action != MergeAction::Noop) {
        let _ = writeln!(out, "## {} ({})\n", decision.exercise_name, decision.action.as_str());
        for change in &decision.changes {
            let _ = writeln!(
                out,
                "- `{}`: {} -> {}",
                change.column,
                cell(change.old.as_deref()),
                cell(change.new.as_deref())
            );
        }
        for conflict in &decision.conflicts {
            let _ = writeln!(
                out,
                "- conflict `{}`: catalog {} vs incoming {}",
                conflict.column.as_str(),
                conflict.existing,
                conflict.incoming
            );
        }
        for note in &decision.notes {
            let _ = writeln!(out, "- note: {}", note);
        }
        out.push('\n');
    }

    std::fs::write(path, out).map_err(|e| CatalogError::io_with_path(e, path))
}

/// Identity collisions and field conflicts for manual review.
pub fn write_conflicts_md(
    path: &Path,
    duplicates: &[DuplicateGroup],
    conflicts: &[FieldConflict],
) -> Result<()> {
    ensure_parent(path)?;
    let mut out = String::from("# Conflicts\n\n");
    let _ = writeln!(out, "## Duplicate identities ({})\n", duplicates.len());
    if duplicates.is_empty() {
        out.push_str("None.\n");
    } else {
        push_duplicate_list(&mut out, duplicates);
    }
    let _ = writeln!(out, "\n## Field conflicts ({})\n", conflicts.len());
    if conflicts.is_empty() {
        out.push_str("None.\n");
    } else {
        push_conflict_table(&mut out, conflicts);
    }
    std::fs::write(path, out).map_err(|e| CatalogError::io_with_path(e, path))
}

/// Every ambiguous field, for manual resolution.
pub fn write_curation_csv(path: &Path, entries: &[CurationEntry]) -> Result<()> {
    ensure_parent(path)?;
    let mut wtr = csv::Writer::from_path(path).map_err(|e| write_error(e, path))?;
    wtr.write_record([
        "exercise_name",
        "field",
        "source",
        "source_value",
        "mapped_value",
        "reason",
    ])
    .map_err(|e| write_error(e, path))?;
    for entry in entries {
        wtr.write_record([
            entry.exercise_name.as_str(),
            entry.field.as_str(),
            entry.source.as_str(),
            entry.source_value.as_str(),
            entry.mapped_value.as_deref().unwrap_or(""),
            entry.reason.as_str(),
        ])
        .map_err(|e| write_error(e, path))?;
    }
    wtr.flush().map_err(|e| CatalogError::io_with_path(e, path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::report::{RunState, Tool};
    use crate::config::RunMode;
    use crate::models::ScalarColumn;
    use crate::normalize::Normalizer;
    use crate::planner::MergePlanner;
    use crate::reconcile::{AmbiguityReason, SourceName};
    use crate::source::RawRow;
    use crate::staging::stage;
    use tempfile::TempDir;

    fn summary() -> RunSummary {
        RunSummary::new(Tool::Merge, RunMode::DryRun, Path::new("catalog.db"))
    }

    #[test]
    fn test_run_log_is_append_only() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("runs.md");

        let first = summary();
        append_run_log(&log, &first).unwrap();
        let after_first = std::fs::read_to_string(&log).unwrap();

        let mut second = summary();
        second.fail(RunState::RolledBack, "disk full\n  caused by: ENOSPC".into());
        append_run_log(&log, &second).unwrap();
        let after_second = std::fs::read_to_string(&log).unwrap();

        assert!(after_second.starts_with(&after_first));
        assert_eq!(after_second.matches(LOG_HEADER).count(), 1);
        assert!(after_second.contains(&first.run_id));
        assert!(after_second.contains("caused by: ENOSPC"));
    }

    #[test]
    fn test_history_header_written_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.csv");
        append_history_csv(&path, &summary()).unwrap();
        append_history_csv(&path, &summary()).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("run_id,started_at"));
    }

    #[test]
    fn test_preview_csv_columns() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("preview.csv");
        let staged = stage(
            &[RawRow::named(2, "Hack Squat")
                .with_scalar(ScalarColumn::PrimaryMuscleGroup, "quads")],
            &Normalizer::default(),
        );
        let plan = MergePlanner::default().plan_all(&[], &staged);
        write_preview_csv(&path, &plan.decisions).unwrap();

        let mut rdr = csv::Reader::from_path(&path).unwrap();
        let headers = rdr.headers().unwrap().clone();
        assert_eq!(&headers[0], "exercise_name");
        assert_eq!(&headers[2], "primary_muscle_group_diff");
        let row = rdr.records().next().unwrap().unwrap();
        assert_eq!(&row[0], "Hack Squat");
        assert_eq!(&row[1], "insert");
        assert_eq!(&row[2], " -> Quadriceps");
    }

    #[test]
    fn test_curation_csv() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("curation.csv");
        let entries = vec![CurationEntry {
            exercise_name: "Arnold Press".into(),
            field: Column::Scalar(ScalarColumn::PrimaryMuscleGroup),
            source: SourceName::Database,
            source_value: "Shoulders".into(),
            mapped_value: Some("Shoulders".into()),
            reason: AmbiguityReason::ShoulderNoDeltoidEvidence,
        }];
        write_curation_csv(&path, &entries).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains(
            "Arnold Press,primary_muscle_group,database,Shoulders,Shoulders,shoulder_no_deltoid_evidence"
        ));
    }

    #[test]
    fn test_conflicts_md_lists_duplicates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("conflicts.md");
        let duplicates = vec![DuplicateGroup {
            key: "bench press".into(),
            names: vec!["Bench Press".into(), "bench press".into()],
        }];
        write_conflicts_md(&path, &duplicates, &[]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("## Duplicate identities (1)"));
        assert!(text.contains("`Bench Press`, `bench press`"));
    }
}
