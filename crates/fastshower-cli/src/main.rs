use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fastshower_app::Application;
use fastshower_core::config::{EnginesConfig, FastConfig, RunConfig};
use fastshower_stats::record::RunRecord;

#[derive(Parser)]
#[command(name = "fastshower", about = "Toy calorimeter with engine hand-off and fast simulation")]
struct Cli {
    /// Enable verbose debug output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Transport events and write the histograms
    Run(RunArgs),
}

#[derive(clap::Args)]
struct RunArgs {
    /// Run configuration (.toml, .ron or .json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of events
    #[arg(short = 'n', long)]
    nevents: Option<u64>,

    /// Primary particles per event
    #[arg(short = 'p', long = "part-per-event")]
    part_per_event: Option<u32>,

    /// Substitute the fast engine in its volumes
    #[arg(short, long, requires = "input")]
    fast: bool,

    /// Histogram file of a previous run, read by the fast engine
    #[arg(short = 'i', long = "in")]
    input: Option<PathBuf>,

    /// Output histogram file (.json, .ron or .bin)
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Write the geometry description to this file
    #[arg(short = 'e', long)]
    export_geometry: Option<PathBuf>,

    /// Split absorber and gap between two detailed engines
    #[arg(long)]
    split: bool,

    /// Run seed
    #[arg(long)]
    seed: Option<u64>,

    /// Fit the gap energy deposit
    #[arg(long)]
    fit: bool,
}

/// Crates whose spans and events this binary reports.
const CRATES: [&str; 4] = ["fastshower", "fastshower_core", "fastshower_stats", "fastshower_app"];

/// `warn` for dependencies, `level` for our own crates.
fn crate_filter(level: &str) -> String {
    let mut directives = vec!["warn".to_string()];
    directives.extend(CRATES.iter().map(|name| format!("{name}={level}")));
    directives.join(",")
}

/// `--verbose` turns on debug for our crates; otherwise `RUST_LOG` wins and
/// run progress is logged at info.
fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new(crate_filter("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(crate_filter("info")))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run(args) => cmd_run(args),
    }
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

/// Command-line flags override the configuration file.
fn build_config(args: &RunArgs) -> Result<RunConfig> {
    let mut config = match &args.config {
        Some(path) => RunConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => RunConfig::default(),
    };

    if let Some(n) = args.nevents {
        config.run.events = n;
    }
    if let Some(n) = args.part_per_event {
        config.primary.per_event = n;
    }
    if let Some(seed) = args.seed {
        config.run.seed = seed;
    }
    if let Some(out) = &args.out {
        config.export.out = out.clone();
    }
    if let Some(path) = &args.export_geometry {
        config.export.geometry = Some(path.clone());
    }
    if args.fit {
        config.export.fit = true;
    }
    if args.split {
        let pair = EnginesConfig::split_pair();
        let engines = &mut config.engines;
        engines.multi = true;
        engines.split = true;
        if engines.detailed.len() < 2 {
            engines.detailed = pair.detailed;
        }
        if engines.assignment.is_empty() {
            engines.assignment = pair.assignment;
        }
    }
    if args.fast {
        config.engines.multi = true;
        let fast = config.engines.fast.get_or_insert_with(FastConfig::default);
        if let Some(input) = &args.input {
            fast.input = Some(input.clone());
        }
    }

    config.validate().context("invalid run configuration")?;
    Ok(config)
}

fn cmd_run(args: RunArgs) -> Result<()> {
    let config = build_config(&args)?;
    tracing::debug!(?config, "effective configuration");
    let out = config.export.out.clone();
    let app = Application::new(config).context("failed to initialise the application")?;
    let record = app.run_and_write().context("run failed")?;
    print_summary(&record, &out);
    Ok(())
}

fn print_summary(record: &RunRecord, out: &std::path::Path) {
    println!("events:     {}", record.meta.events);
    println!("engines:    {}", record.meta.engines.join(", "));
    if let Some(gap) = record.h1("histEdepGap") {
        println!("edep gap:   {:.6} GeV (rms {:.6})", gap.mean(), gap.std_dev());
    }
    if let Some(crossings) = record.sequence("crossings") {
        println!("crossings:  {}", crossings.values.iter().sum::<u32>());
    }
    if let Some(fit) = &record.fit {
        println!("fit:        mean {:.6} sigma {:.6}", fit.mean, fit.sigma);
    }
    println!("histograms: {}", out.display());
}
