//! MOT Sim headless runner
//!
//! Runs a batch of trials and prints each one's data as a JSON line.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use mot_sim::sim::{Session, TrialCondition};
use mot_sim::{Result, Settings};

#[derive(Parser, Debug)]
#[command(
    name = "mot-sim",
    version,
    about = "Run multiple-object-tracking trials headlessly and print them as JSON lines"
)]
struct Args {
    /// Settings file (JSON); built-in defaults when omitted.
    settings: Option<PathBuf>,

    /// Number of trials, cycling control, crossed and changed.
    #[arg(long, default_value_t = 3)]
    trials: u64,

    /// Seed of the first trial; each later trial adds one.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Tracked stimuli per trial (defaults to the settings value).
    #[arg(long)]
    tracked: Option<usize>,
}

fn run(args: Args) -> Result<()> {
    let settings = match &args.settings {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    let tracked = args.tracked.unwrap_or(settings.stimulus.tracked);

    let mut session = Session::new(settings)?;
    let conditions = TrialCondition::ALL;

    for trial in 0..args.trials {
        let condition = conditions[(trial % conditions.len() as u64) as usize];
        let data = session.run_trial(condition, tracked, args.seed.wrapping_add(trial))?;
        println!("{}", serde_json::to_string(&data)?);
    }

    log::info!("Ran {} trials", args.trials);
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    env_logger::init();
    log::info!("MOT Sim (headless) starting...");

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
