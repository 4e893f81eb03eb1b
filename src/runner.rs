//! The command line runner: loads a configuration, executes one run per seed and writes the
//! histories and a summary table.
//!
//! ```text
//! roomsim --config room.json --random-seed 7 --runs 10 --output-dir out
//! ```
//!
//! With `--output-dir`, every run writes `run_<seed>/agents.csv` and `run_<seed>/room.csv`, and
//! the directory receives `summary.csv`, `units.csv` and a copy of the configuration as
//! `parameters.json`. Without it the summary table is printed to standard output.
use std::fs::{create_dir_all, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::SimError;
use crate::log::{info, set_log_level, LevelFilter};
use crate::model::{Model, RunSummary};
use crate::parameters::Parameters;
use crate::report::{write_csv, write_csv_to};
use clap::{Args, Command, FromArgMatches as _};

/// Default cli arguments for the roomsim runner
#[derive(Args, Debug, Clone)]
pub struct BaseArgs {
    /// Path of the JSON configuration file
    #[arg(short, long)]
    pub config: PathBuf,

    /// Random seed of the first run
    #[arg(short, long, default_value = "0")]
    pub random_seed: u64,

    /// Number of runs; run `i` uses seed `random_seed + i`
    #[arg(long, default_value = "1")]
    pub runs: u64,

    /// Optional directory for histories and the summary table
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Fail a run that has not terminated after this many steps
    #[arg(long)]
    pub max_steps: Option<usize>,

    /// Log level: off, error, warn, info, debug or trace
    #[arg(short, long)]
    pub log_level: Option<String>,
}

fn create_roomsim_cli() -> Command {
    let cli = Command::new("roomsim");
    BaseArgs::augment_args(cli)
}

/// Runs the simulations described by the command line arguments.
///
/// # Errors
/// Returns an error if argument parsing, configuration loading or one of the runs fails
#[allow(clippy::missing_errors_doc)]
pub fn run_with_args() -> Result<Vec<RunSummary>, Box<dyn std::error::Error>> {
    let cli = create_roomsim_cli();
    let matches = cli.get_matches();

    let base_args_matches = BaseArgs::from_arg_matches(&matches)?;
    Ok(run_with_args_internal(&base_args_matches)?)
}

/// Runs the simulations for already parsed arguments and returns one summary per seed.
///
/// # Errors
/// Returns an error if the configuration is invalid, a run fails or output cannot be written
pub fn run_with_args_internal(args: &BaseArgs) -> Result<Vec<RunSummary>, SimError> {
    if let Some(level) = &args.log_level {
        let level = LevelFilter::from_str(level)
            .map_err(|_| SimError::config(format!("unknown log level `{level}`")))?;
        set_log_level(level);
    }

    info!("Loading parameters from: {}", args.config.display());
    let parameters = Parameters::from_json_file(&args.config)?;
    // Resolve once up front so a bad configuration fails before any output is written.
    parameters.resolve()?;

    let mut summaries = Vec::new();
    for seed in args.random_seed..args.random_seed.saturating_add(args.runs) {
        let mut model = Model::new(&parameters, seed)?;
        let summary = match args.max_steps {
            Some(max_steps) => model.run_until(max_steps)?,
            None => model.run()?,
        };
        if let Some(output_dir) = &args.output_dir {
            model.write_histories(&output_dir.join(format!("run_{seed}")))?;
        }
        summaries.push(summary);
    }

    match &args.output_dir {
        Some(output_dir) => write_outputs(output_dir, &parameters, &summaries)?,
        None => write_csv_to(&summaries, io::stdout().lock())?,
    }
    Ok(summaries)
}

fn write_outputs(
    output_dir: &Path,
    parameters: &Parameters,
    summaries: &[RunSummary],
) -> Result<(), SimError> {
    create_dir_all(output_dir)?;
    write_csv(summaries, &output_dir.join("summary.csv"))?;
    write_csv(Model::history_units(), &output_dir.join("units.csv"))?;
    let file = File::create(output_dir.join("parameters.json"))?;
    serde_json::to_writer_pretty(BufWriter::new(file), parameters)?;
    info!("Wrote {} runs to {}", summaries.len(), output_dir.display());
    Ok(())
}
