use std::collections::BTreeSet;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use rirstats::as_flows::AsFlows;
use rirstats::coverage::Coverage;
use rirstats::pipeline::{build_routing_table, classify_parallel};
use rirstats::report::ReportWriter;
use rirstats::{
    load_config, ConfigError, Error, Mode, Observation, ObservationReader, Registry,
    ResourceCatalog, RunConfig,
};

#[derive(Parser, Debug)]
#[command(name = "rirstats")]
#[command(version, about = "Per-country AS roles from RIR delegations and BGP paths", long_about = None)]
struct Args {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Delegation feed
    #[arg(long)]
    delegated: Option<PathBuf>,

    /// `prefix|as path` observations
    #[arg(long)]
    observations: Option<PathBuf>,

    /// Report directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Tracked registry region
    #[arg(long, value_parser = parse_region)]
    region: Option<Registry>,

    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Classification threads, 0 for one per CPU
    #[arg(short, long)]
    workers: Option<usize>,

    /// Run date (YYYYMMDD) used in report names
    #[arg(long)]
    date: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Countries,
    Ixp,
}

impl From<ModeArg> for Mode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Countries => Mode::Countries,
            ModeArg::Ixp => Mode::Ixp,
        }
    }
}

fn parse_region(s: &str) -> Result<Registry, String> {
    s.parse()
        .map_err(|_| format!("unknown region {:?}, expected one of afrinic, apnic, arin, lacnic, ripencc", s))
}

fn main() -> ExitCode {
    let args = Args::parse();

    let config = match build_config(args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("rirstats: {}", e);
            return ExitCode::FAILURE;
        }
    };
    init_logging(&config);

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// Config file (or defaults) with command line overrides applied.
fn build_config(args: Args) -> Result<RunConfig, ConfigError> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => RunConfig::default(),
    };

    if let Some(path) = args.delegated {
        config.delegated_path = Some(path);
    }
    if let Some(path) = args.observations {
        config.observations_path = Some(path);
    }
    if let Some(dir) = args.output {
        config.output_dir = Some(dir);
    }
    if let Some(region) = args.region {
        config.region = region;
    }
    if let Some(mode) = args.mode {
        config.mode = mode.into();
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(date) = args.date {
        config.date = Some(date);
    }

    config.validate()?;
    Ok(config)
}

/// Initialize logging
fn init_logging(config: &RunConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn run(config: &RunConfig) -> Result<(), Error> {
    let regions = config.regions()?;
    let catalog = ResourceCatalog::from_path(config.delegated_path())?;
    let observations = read_observations(&config.observations_path())?;
    let writer = ReportWriter::new(config.output_dir(), config.date())?;

    match config.mode {
        Mode::Countries => {
            let countries = regions.countries(config.region);
            info!(region = %config.region, countries = countries.len(), "Tracking countries");
            let (db, stats) =
                classify_parallel(&catalog, &countries, &observations, config.workers());
            let flows = AsFlows::build(&db, &catalog, &regions, config.region);
            writer.write_countries(&db, &flows, &stats)?;
        }
        Mode::Ixp => {
            let (table, _) =
                build_routing_table(&catalog, &regions, config.region, &observations)?;

            let coverage = match (config.coverage_country()?, &config.coverage_rib_path) {
                (Some(country), Some(path)) => {
                    let rib = read_observations(path)?;
                    let tracked = BTreeSet::from([country]);
                    let (db, _) = classify_parallel(&catalog, &tracked, &rib, config.workers());
                    Some(Coverage::build(&table, &db, country))
                }
                _ => None,
            };
            writer.write_ixp(&table, coverage.as_ref())?;
        }
    }

    info!(output = %writer.output_dir().display(), "Done");
    Ok(())
}

fn read_observations(path: &Path) -> Result<Vec<Observation>, Error> {
    let file = File::open(path)?;
    let mut reader = ObservationReader::new(BufReader::new(file));

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner} [{elapsed_precise}] {pos} routes read")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );

    let mut observations = Vec::new();
    for observation in reader.by_ref() {
        observations.push(observation?);
        pb.inc(1);
    }
    pb.finish_and_clear();

    info!(
        path = %path.display(),
        observations = observations.len(),
        malformed = reader.malformed(),
        "Observations read"
    );
    Ok(observations)
}
