//! Exercat - merge, reconcile and backfill tools for the exercise catalog.
//!
//! Every subcommand runs one pipeline against the SQLite catalog, either as a
//! dry run (reports only) or with `--apply`. The process exit code reflects
//! the outcome: 0 success, 1 store failure, 2 input error, 3 duplicate
//! identities in the catalog, 4 self-test failure.

mod commands;

use clap::{Parser, Subcommand};
use exercat_core::CatalogError;
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

use commands::{BackfillArgs, MergeArgs, ReconcileArgs};

#[derive(Parser, Debug)]
#[command(name = "exercat")]
#[command(about = "Exercise catalog merge and reconciliation tools")]
#[command(version)]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Print the run summary as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Run the built-in smoke test against a temporary catalog and exit
    #[arg(long)]
    self_test: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Merge a CSV or spreadsheet source into the catalog (fill-only)
    Merge(MergeArgs),
    /// Same as merge, labelled as a spreadsheet import in the audit trail
    Import(MergeArgs),
    /// Reconcile muscle fields against the merge preview and MuscleWiki
    Reconcile(ReconcileArgs),
    /// Rewrite catalog rows into canonical form
    Backfill(BackfillArgs),
}

fn main() {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let code = match run(args) {
        Ok(code) => code,
        Err(err) => {
            error!("{:#}", err);
            err.downcast_ref::<CatalogError>()
                .map(CatalogError::exit_code)
                .unwrap_or(1)
        }
    };
    std::process::exit(code);
}

fn run(args: Args) -> anyhow::Result<i32> {
    if args.self_test {
        return commands::self_test(args.json);
    }

    match args.command {
        Some(Command::Merge(cmd)) => commands::merge::run(&cmd, false, args.json),
        Some(Command::Import(cmd)) => commands::merge::run(&cmd, true, args.json),
        Some(Command::Reconcile(cmd)) => commands::reconcile::run(&cmd, args.json),
        Some(Command::Backfill(cmd)) => commands::backfill::run(&cmd, args.json),
        None => anyhow::bail!("no subcommand given (try --help or --self-test)"),
    }
}
