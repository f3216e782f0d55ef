//! `merge` and `import`: fill-only merge of one tabular source.

use clap::Args;
use exercat_core::{ConflictPolicy, Pipeline, Tool};
use std::path::PathBuf;
use tracing::info;

use super::{report, source_spec, RunArgs};

#[derive(Args, Debug)]
pub struct MergeArgs {
    /// Source file (.csv, .tsv, .xlsx, .xlsm, .xls, .ods)
    pub source: PathBuf,

    /// Workbook sheet, by zero-based index or name
    #[arg(long)]
    pub sheet: Option<String>,

    /// Skip incoming rows with no catalog match instead of inserting them
    #[arg(long)]
    pub update_only: bool,

    /// Let the source overwrite conflicting catalog values
    #[arg(long)]
    pub prefer_source: bool,

    #[command(flatten)]
    pub run: RunArgs,
}

pub fn run(args: &MergeArgs, import: bool, json: bool) -> anyhow::Result<i32> {
    let mut options = args.run.options();
    options.update_only = args.update_only;
    if args.prefer_source {
        options.conflict_policy = ConflictPolicy::PreferIncoming;
    }
    let tool = if import { Tool::Import } else { Tool::Merge };
    info!(
        "{} {} into {} ({})",
        tool.as_str(),
        args.source.display(),
        options.db_path.display(),
        options.mode.as_str()
    );

    let pipeline = Pipeline::new(options);
    let outcome = pipeline.merge(&source_spec(&args.source, args.sheet.as_deref()), tool)?;
    report(&outcome, json)
}
