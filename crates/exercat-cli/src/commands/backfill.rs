//! `backfill`: normalization sweep over the whole catalog.

use clap::Args;
use exercat_core::Pipeline;

use super::{report, RunArgs};

#[derive(Args, Debug)]
pub struct BackfillArgs {
    #[command(flatten)]
    pub run: RunArgs,
}

pub fn run(args: &BackfillArgs, json: bool) -> anyhow::Result<i32> {
    let pipeline = Pipeline::new(args.run.options());
    let outcome = pipeline.backfill()?;
    report(&outcome, json)
}
