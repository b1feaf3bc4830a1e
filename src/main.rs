use std::path::PathBuf;
use std::process::ExitCode;

use rand::SeedableRng;
use rand::rngs::SmallRng;
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ragdoll_walker::{
    BodyPlan, ControlMode, OscillatorPolicy, Result, SimError, SimulationLoop, StartingPose,
    TrialConfig, TrialOutcome,
};

const DEFAULT_TRIALS: usize = 8;
const DEFAULT_SEED: u64 = 42;
const RATE_MODE_OUTPUT_SCALE: f32 = 3.0;

#[derive(Debug)]
struct CliArgs {
    config: Option<PathBuf>,
    plan: Option<PathBuf>,
    trials: usize,
    seed: u64,
    pose: StartingPose,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchSummary {
    seed: u64,
    joints: Vec<String>,
    outcomes: Vec<TrialOutcome>,
    best_index: Option<usize>,
    best_fitness: f32,
}

fn main() -> ExitCode {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();

    let args: Vec<String> = std::env::args().collect();
    match parse_args(&args).and_then(run) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: CliArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => TrialConfig::from_json_file(path)?,
        None => TrialConfig::default(),
    }
    .with_env_overrides();
    let plan = match &args.plan {
        Some(path) => BodyPlan::from_json_file(path)?,
        None => BodyPlan::humanoid(args.pose),
    };
    let output_scale = match plan.control {
        ControlMode::Torque => 1.0,
        ControlMode::Rate => RATE_MODE_OUTPUT_SCALE,
    };
    let simulation = SimulationLoop::new(config, plan)?;
    let joints: Vec<String> = simulation
        .plan()
        .actuated_joint_names()
        .into_iter()
        .map(str::to_string)
        .collect();
    info!(
        "evaluating {} oscillator policies (seed {}, {} joints, {} policy inputs)",
        args.trials,
        args.seed,
        joints.len(),
        simulation.input_len()
    );

    let mut rng = SmallRng::seed_from_u64(args.seed);
    let mut outcomes = Vec::with_capacity(args.trials);
    for trial in 0..args.trials {
        let mut policy =
            OscillatorPolicy::random(joints.len(), simulation.config().timestep(), &mut rng)
                .with_output_scale(output_scale);
        let outcome = simulation.run_trial(&mut policy)?;
        info!(
            "trial {}/{}: fitness {:.3}, distance {:.2} m, {:?}",
            trial + 1,
            args.trials,
            outcome.fitness,
            outcome.max_distance,
            outcome.reason
        );
        outcomes.push(outcome);
    }

    let best_index = outcomes
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.fitness.total_cmp(&b.fitness))
        .map(|(index, _)| index);
    let summary = BatchSummary {
        seed: args.seed,
        best_fitness: best_index.map_or(0.0, |index| outcomes[index].fitness),
        best_index,
        joints,
        outcomes,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn parse_args(args: &[String]) -> Result<CliArgs> {
    let mut parsed = CliArgs {
        config: None,
        plan: None,
        trials: DEFAULT_TRIALS,
        seed: DEFAULT_SEED,
        pose: StartingPose::Walking,
    };
    let mut iter = args.iter().skip(1);
    while let Some(flag) = iter.next() {
        let mut value = || {
            iter.next()
                .cloned()
                .ok_or_else(|| SimError::Config(format!("{flag} needs a value")))
        };
        match flag.as_str() {
            "--config" => parsed.config = Some(PathBuf::from(value()?)),
            "--plan" => parsed.plan = Some(PathBuf::from(value()?)),
            "--trials" => parsed.trials = parse_number(flag, &value()?)?,
            "--seed" => parsed.seed = parse_number(flag, &value()?)?,
            "--pose" => parsed.pose = value()?.parse()?,
            other => {
                return Err(SimError::Config(format!(
                    "unknown argument '{other}'; usage: ragdoll-walker [--config PATH] \
                     [--plan PATH] [--trials N] [--seed S] [--pose walking|standing]"
                )));
            }
        }
    }
    Ok(parsed)
}

fn parse_number<T: std::str::FromStr>(flag: &str, raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| SimError::Config(format!("{flag} expects a number; got '{raw}'")))
}
