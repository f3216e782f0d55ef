//! `reconcile`: resolve muscle fields across the merge preview, MuscleWiki
//! and the catalog itself.

use clap::Args;
use exercat_core::{AmbiguityPolicy, Pipeline, ReconcileInputs};
use std::path::PathBuf;

use super::{report, source_spec, RunArgs};

#[derive(Args, Debug)]
pub struct ReconcileArgs {
    /// Hand-edited merge preview (highest precedence)
    #[arg(long, value_name = "FILE")]
    pub preview: Option<PathBuf>,

    /// Sheet of the merge preview workbook
    #[arg(long)]
    pub preview_sheet: Option<String>,

    /// MuscleWiki export
    #[arg(long, value_name = "FILE")]
    pub musclewiki: Option<PathBuf>,

    /// Sheet of the MuscleWiki workbook
    #[arg(long)]
    pub musclewiki_sheet: Option<String>,

    /// Apply rows with ambiguous fields, leaving only those fields untouched
    #[arg(long)]
    pub apply_partial: bool,

    /// Write every ambiguous field here for manual curation
    #[arg(long, value_name = "FILE")]
    pub curation_csv: Option<PathBuf>,

    #[command(flatten)]
    pub run: RunArgs,
}

pub fn run(args: &ReconcileArgs, json: bool) -> anyhow::Result<i32> {
    let mut options = args.run.options();
    if args.apply_partial {
        options.ambiguity_policy = AmbiguityPolicy::ApplyPartial;
    }
    options.curation_csv = args.curation_csv.clone();

    let inputs = ReconcileInputs {
        merge_preview: args
            .preview
            .as_deref()
            .map(|p| source_spec(p, args.preview_sheet.as_deref())),
        musclewiki: args
            .musclewiki
            .as_deref()
            .map(|p| source_spec(p, args.musclewiki_sheet.as_deref())),
    };

    let pipeline = Pipeline::new(options);
    let outcome = pipeline.reconcile(&inputs)?;
    report(&outcome, json)
}
