pub mod config;
mod context;
mod convergence;
pub mod error;
mod executor;
mod pool;
mod sequential;
mod training;

use std::{num::NonZeroUsize, process};

use comms::{Gate, WorkQueue};
use log::{error, info};
use ml_core::{Learner, Optimizer};
use worker::Worker;

pub use config::{EvalSchedule, Mode, TrainingConfig};
pub use context::{RunContext, StopHandle};
pub use convergence::{ConvergenceTracker, Verdict};
pub use error::OrchestratorError;
pub use training::TrainingSummary;

use pool::Role;
use sequential::Sequential;

/// Trains across `config.workers` forked worker processes.
///
/// The calling process becomes the orchestrator, every worker starts as a
/// copy of it and never returns from this function: it exits with status `0`
/// once stopped, or `1` after logging its failure.
///
/// # Arguments
/// * `ctx` - The run's context.
/// * `config` - The training configuration.
/// * `learner` - The per-datum scoring strategy, copied into every worker.
/// * `optimizer` - The model's update rule, copied into every worker.
/// * `train` - The training set.
/// * `dev` - The dev set, possibly empty.
///
/// # Returns
/// A summary of the run.
///
/// # Errors
/// Returns `OrchestratorError::InvalidConfig` before spawning anything if the
/// configuration is invalid, or the first failure of the run otherwise, in
/// which case every worker is killed.
pub fn run_multi_process<D, L, O>(
    ctx: &RunContext,
    config: &TrainingConfig,
    learner: &mut L,
    optimizer: &mut O,
    train: &[D],
    dev: &[D],
) -> Result<TrainingSummary<L::Loss>, OrchestratorError>
where
    L: Learner<D>,
    O: Optimizer,
{
    config.validate(Mode::MultiProcess, train.len(), dev.len())?;
    let workers = NonZeroUsize::new(config.workers)
        .ok_or_else(|| OrchestratorError::InvalidConfig("workers must be greater than zero".into()))?;

    let queue = WorkQueue::new(config.queue_capacity(train.len(), dev.len()))?;
    let gate = Gate::new()?;
    info!("run {}: training with {workers} worker process(es)", ctx.run_id());

    match pool::spawn(workers, &queue, ctx.stop().clone())? {
        Role::Worker(endpoint) => {
            let worker_id = endpoint.worker_id;
            let worker = Worker::new(worker_id, workers, train, dev);
            let code = match worker.run(learner, optimizer, endpoint.rx, endpoint.tx, &queue, &gate) {
                Ok(_) => 0,
                Err(e) => {
                    error!(worker_id = worker_id; "worker failed: {e}");
                    1
                }
            };
            process::exit(code);
        }
        Role::Orchestrator(mut pool) => {
            let base_rate = optimizer.base_rate();
            match training::train_loop::<D, _, _>(ctx, config, learner, &mut pool, train.len(), dev.len(), base_rate) {
                Ok(summary) => {
                    pool.shutdown()?;
                    Ok(summary)
                }
                Err(e) => {
                    error!("run {} failed: {e}", ctx.run_id());
                    pool.abort();
                    Err(e)
                }
            }
        }
    }
}

/// Trains in the calling process, with the exact same loop as
/// [`run_multi_process`].
///
/// # Arguments
/// * `ctx` - The run's context.
/// * `config` - The training configuration, `workers` is ignored.
/// * `learner` - The per-datum scoring strategy.
/// * `optimizer` - The model's update rule, applied every `config.batch_size` items.
/// * `train` - The training set.
/// * `dev` - The dev set, possibly empty.
///
/// # Returns
/// A summary of the run.
///
/// # Errors
/// Returns `OrchestratorError::InvalidConfig` if the configuration is invalid,
/// or the first failure of the run otherwise.
pub fn run_single_process<D, L, O>(
    ctx: &RunContext,
    config: &TrainingConfig,
    learner: &mut L,
    optimizer: &mut O,
    train: &[D],
    dev: &[D],
) -> Result<TrainingSummary<L::Loss>, OrchestratorError>
where
    L: Learner<D>,
    O: Optimizer,
{
    config.validate(Mode::SingleProcess, train.len(), dev.len())?;
    info!("run {}: training in a single process", ctx.run_id());

    let base_rate = optimizer.base_rate();
    let mut executor = Sequential::new(
        train,
        dev,
        optimizer,
        config.batch_size,
        ctx.stop().clone(),
        ctx.started_at(),
    );
    training::train_loop::<D, _, _>(ctx, config, learner, &mut executor, train.len(), dev.len(), base_rate)
}
