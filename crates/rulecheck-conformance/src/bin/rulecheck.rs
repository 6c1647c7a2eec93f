//! Access-rule conformance CLI.
//!
//! - `rulecheck plan` - register every scenario and print the plan
//! - `rulecheck run` - plan, execute against the emulator, report

#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rulecheck_conformance::{RunLog, SuiteConfig, plan_suite, run_suite};
use tracing::info;

/// Access-rule conformance runner.
#[derive(Parser)]
#[command(name = "rulecheck")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register every scenario and print the resulting cases.
    ///
    /// Reads the feature flag from the suite's seed documents but never
    /// contacts the backend.
    Plan(PlanArgs),

    /// Plan, then execute every case against the emulator.
    ///
    /// Exits non-zero unless every executed case passed.
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct PlanArgs {
    /// Suite file (TOML).
    #[arg(long, short = 'c')]
    config: PathBuf,

    /// Output JSON instead of human-readable format.
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Suite file (TOML).
    #[arg(long, short = 'c')]
    config: PathBuf,

    /// Only run cases whose "<persona> <description>" contains this string.
    #[arg(long, short = 'f')]
    filter: Option<String>,

    /// Write the structured run log (JSONL) here.
    #[arg(long)]
    log: Option<PathBuf>,

    /// Output JSON instead of human-readable format.
    #[arg(long, default_value_t = false)]
    json: bool,
}

fn main() -> Result<ExitCode> {
    // Logs go to stderr so stdout stays clean for JSON output.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Plan(args) => plan(&args),
        Commands::Run(args) => run(&args),
    }
}

fn load(path: &Path) -> Result<SuiteConfig> {
    SuiteConfig::load(path).with_context(|| format!("loading suite {}", path.display()))
}

fn plan(args: &PlanArgs) -> Result<ExitCode> {
    let config = load(&args.config)?;
    let client = reqwest::Client::new();
    let plan = plan_suite(&config, &client, &RunLog::new()).context("registering scenarios")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan.outline())?);
        return Ok(ExitCode::SUCCESS);
    }

    for group in plan.groups() {
        println!(
            "{} [{}] (public dashboard {})",
            group.title,
            group.collection,
            group.flags.state_name()
        );
        match &group.cases {
            Ok(cases) => {
                for planned in cases {
                    println!("  {}", planned.case.description);
                }
            }
            Err(err) => println!("  error: {err}"),
        }
    }
    println!("\n{} cases", plan.case_count());

    let errored = plan.registration_errors().count();
    Ok(if errored == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn run(args: &RunArgs) -> Result<ExitCode> {
    let config = load(&args.config)?;
    let client = reqwest::Client::builder()
        .build()
        .context("building HTTP client")?;
    let log = RunLog::new();
    info!(
        correlation_id = log.correlation_id(),
        emulator = %config.emulator_url,
        project = config.project_id(),
        "starting conformance run"
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;
    let report = runtime
        .block_on(run_suite(&config, &client, args.filter.clone(), &log))
        .context("running suite")?;

    if let Some(path) = &args.log {
        log.write_jsonl(path)
            .with_context(|| format!("writing run log {}", path.display()))?;
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.render_text());
    }

    Ok(if report.all_passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
