use std::{env, path::PathBuf};

use anyhow::Context;
use log::info;
use orchestrator::{Mode, RunContext, TrainingConfig, run_multi_process, run_single_process};
use parallel_trainer::regression::{Model, Regression, Sgd, synthetic};
use rand::{SeedableRng, rngs::StdRng};

const BASE_RATE: f32 = 0.05;
const EPOCH_DECAY: f32 = 0.9;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = match env::var_os("TRAINING_CONFIG") {
        Some(path) => TrainingConfig::from_json_file(&path)
            .with_context(|| format!("loading config from {}", PathBuf::from(&path).display()))?,
        None => TrainingConfig::default(),
    };
    let mode = if env::var_os("SINGLE_PROCESS").is_some() {
        Mode::SingleProcess
    } else {
        Mode::MultiProcess
    };
    let checkpoint_dir = env::var_os("CHECKPOINT_DIR").map(PathBuf::from);

    let mut rng = StdRng::seed_from_u64(config.seed.unwrap_or(42));
    let train = synthetic(&mut rng, 20_000, [1.5, -2.0], 0.3);
    let dev = synthetic(&mut rng, 2_000, [1.5, -2.0], 0.3);

    let model = Model::new(BASE_RATE)?;
    let mut learner = Regression::new(&model, checkpoint_dir);
    let mut sgd = Sgd::new(&model, BASE_RATE, EPOCH_DECAY);
    let ctx = RunContext::new();

    let summary = match mode {
        Mode::MultiProcess => run_multi_process(&ctx, &config, &mut learner, &mut sgd, &train, &dev)?,
        Mode::SingleProcess => run_single_process(&ctx, &config, &mut learner, &mut sgd, &train, &dev)?,
    };

    info!(
        "done: {} epoch(s), {} round(s), best dev mse {:?}, params {:?}",
        summary.epochs_run,
        summary.rounds,
        summary.best_dev.map(|loss| loss.mean()),
        model.params()?
    );
    Ok(())
}
