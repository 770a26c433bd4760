use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use epistats_logger::config::ConfigLoader;
use epistats_logger::controller::{BatchController, RunOptions, RunReport, RunState, StatusReport};
use epistats_logger::domain::{ReplacePolicy, RunMode};
use epistats_logger::error::StatsError;
use epistats_logger::fetcher::FetchOutcome;
use epistats_logger::output::{JsonOutput, LogSink, OutputMode, ProgressSink};

#[derive(Parser)]
#[command(name = "epistats")]
#[command(about = "Stage per-area epidemiological stats from the stats API and load them into SQLite stores")]
#[command(version)]
struct Cli {
    /// Print reports as JSON on stdout.
    #[arg(long, global = true)]
    json: bool,

    /// Settings file (defaults to ./settings.json).
    #[arg(long, global = true)]
    settings: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Fetch, load and clean up staging for a mode")]
    Run(RunArgs),
    #[command(about = "Fetch into staging only")]
    Fetch(RunArgs),
    #[command(about = "Load whatever is staged, without contacting the API")]
    Load(ModeArgs),
    #[command(about = "List staged entries")]
    Status(ModeArgs),
    #[command(about = "Delete staged entries")]
    Clear(ModeArgs),
}

#[derive(Args, Clone)]
struct ModeArgs {
    #[arg(value_enum)]
    mode: RunMode,
}

#[derive(Args, Clone)]
struct RunArgs {
    #[arg(value_enum)]
    mode: RunMode,

    #[arg(long, value_enum, conflicts_with_all = ["storeonly", "noreplace"])]
    replace: Option<ReplacePolicy>,

    /// Same as --replace skip-fetch.
    #[arg(long, conflicts_with = "noreplace")]
    storeonly: bool,

    /// Same as --replace skip-if-present.
    #[arg(long)]
    noreplace: bool,

    #[arg(long)]
    fetch_only: bool,
}

impl RunArgs {
    fn policy(&self) -> ReplacePolicy {
        if self.storeonly {
            ReplacePolicy::SkipFetch
        } else if self.noreplace {
            ReplacePolicy::SkipIfPresent
        } else {
            self.replace.unwrap_or_default()
        }
    }
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<StatsError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &StatsError) -> u8 {
    match error {
        StatsError::MissingConfig
        | StatsError::ConfigRead(_)
        | StatsError::ConfigParse(_)
        | StatsError::InvalidConfig(_) => 2,
        StatsError::CatalogUnavailable(_) | StatsError::FetchFailed { .. } => 3,
        StatsError::DestinationUnavailable { .. } | StatsError::DestinationWriteFailed { .. } => 4,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    let config = ConfigLoader::resolve(cli.settings.as_deref())?;
    let mut controller = BatchController::from_config(&config)?;
    let sink: &dyn ProgressSink = match output_mode {
        OutputMode::Json => &JsonOutput,
        OutputMode::Human => &LogSink,
    };

    match cli.command {
        Commands::Run(args) => {
            let options = RunOptions {
                fetch_only: args.fetch_only,
            };
            let report = controller.run(args.mode, args.policy(), options, sink)?;
            emit_run(&report, output_mode)
        }
        Commands::Fetch(args) => {
            let options = RunOptions { fetch_only: true };
            let report = controller.run(args.mode, args.policy(), options, sink)?;
            emit_run(&report, output_mode)
        }
        Commands::Load(args) => {
            let report = controller.run(
                args.mode,
                ReplacePolicy::SkipFetch,
                RunOptions::default(),
                sink,
            )?;
            emit_run(&report, output_mode)
        }
        Commands::Status(args) => {
            let report = controller.status(args.mode)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_status(&report).into_diagnostic(),
                OutputMode::Human => {
                    print_status(&report);
                    Ok(())
                }
            }
        }
        Commands::Clear(args) => {
            let removed = controller.clear(args.mode)?;
            if matches!(output_mode, OutputMode::Human) {
                println!("removed {removed} staged files");
            }
            Ok(())
        }
    }
}

fn emit_run(report: &RunReport, output_mode: OutputMode) -> miette::Result<()> {
    if report.state == RunState::Aborted {
        tracing::warn!("API quota exceeded; staged files kept for the next run");
    }
    match output_mode {
        OutputMode::Json => JsonOutput::print_run(report).into_diagnostic(),
        OutputMode::Human => {
            print_run_summary(report);
            Ok(())
        }
    }
}

fn print_run_summary(report: &RunReport) {
    println!(
        "epistats {} ({}) -> {:?}",
        report.mode, report.policy, report.state
    );
    for scope in &report.scopes {
        match &scope.fetch {
            Some(FetchOutcome::Completed(summary)) => println!(
                "  {}: fetched {}, skipped {}",
                scope.scope,
                summary.fetched.len(),
                summary.skipped.len()
            ),
            Some(FetchOutcome::QuotaExceeded { area, summary }) => println!(
                "  {}: quota exceeded at {area} after {} fetched",
                scope.scope,
                summary.fetched.len()
            ),
            None => println!("  {}: not fetched", scope.scope),
        }
        if let Some(load) = &scope.load {
            println!(
                "  {}: loaded {} files ({} records), {} malformed, {} failed writes",
                scope.scope,
                load.files_loaded,
                load.records,
                load.files_malformed.len(),
                load.write_failures
            );
        }
        if let Some(cleared) = scope.cleared {
            println!("  {}: cleared {cleared} staged files", scope.scope);
        }
    }
}

fn print_status(report: &StatusReport) {
    for scope in &report.scopes {
        println!(
            "{} ({}): {} staged",
            scope.scope,
            scope.directory,
            scope.staged.len()
        );
        for area in &scope.staged {
            println!("  {area}");
        }
    }
}
