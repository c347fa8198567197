use comms::msg::RoundHeader;
use log::{debug, info, warn};
use ml_core::{EvalPoint, Learner};
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};

use crate::{
    ConvergenceTracker, EvalSchedule, OrchestratorError, RunContext, TrainingConfig,
    executor::{Round, RoundExecutor},
};

/// What a training run went through.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSummary<L> {
    /// Epochs started, the last one possibly interrupted.
    pub epochs_run: u32,
    /// Train and dev rounds run.
    pub rounds: u64,
    pub best_dev: Option<L>,
    pub best_train: Option<L>,
    /// The learning scale at the end of the run.
    pub learning_scale: f32,
    /// Whether the run ended before exhausting its epochs.
    pub stopped_early: bool,
    /// Items left unscored because of a stop request.
    pub discarded: u64,
}

/// Runs the training loop shared by both execution modes.
///
/// Every epoch permutes the training set and splits it into rounds. At each
/// evaluation point the dev set is scored, if any, and the losses go through
/// the convergence tracker, which may checkpoint the model, decay the
/// learning scale or stop the run.
///
/// # Arguments
/// * `ctx` - The run's context.
/// * `config` - The training configuration, already validated.
/// * `learner` - The orchestrator's learner.
/// * `executor` - Runs the rounds.
/// * `train_len` - The size of the training set.
/// * `dev_len` - The size of the dev set, possibly zero.
/// * `base_rate` - The optimizer's base learning rate.
///
/// # Errors
/// Returns the first error found by the executor or the learner's checkpoints.
pub(crate) fn train_loop<D, L, E>(
    ctx: &RunContext,
    config: &TrainingConfig,
    learner: &mut L,
    executor: &mut E,
    train_len: usize,
    dev_len: usize,
    base_rate: f32,
) -> Result<TrainingSummary<L::Loss>, OrchestratorError>
where
    L: Learner<D>,
    E: RoundExecutor<D, L>,
{
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let mut train_indices: Vec<u32> = (0..train_len as u32).collect();
    let dev_indices: Vec<u32> = (0..dev_len as u32).collect();
    let has_dev = !dev_indices.is_empty();

    let mut tracker =
        ConvergenceTracker::with_rate_threshold(config.rate_decay, config.rate_threshold, base_rate);
    let mut summary = TrainingSummary {
        epochs_run: 0,
        rounds: 0,
        best_dev: None,
        best_train: None,
        learning_scale: tracker.learning_scale(),
        stopped_early: false,
        discarded: 0,
    };

    info!(
        "run {}: {} epoch(s) over {train_len} train and {dev_len} dev item(s)",
        ctx.run_id(),
        config.epochs
    );

    'epochs: for epoch in 1..=config.epochs {
        if ctx.stop().is_requested() {
            summary.stopped_early = true;
            break;
        }

        train_indices.shuffle(&mut rng);
        summary.epochs_run = epoch;

        let slices = train_indices.chunks(config.round_size);
        let last_slice = slices.len() - 1;
        let mut epoch_loss = L::Loss::default();
        let mut consumed = 0;

        for (i, indices) in slices.enumerate() {
            let end_of_epoch = i == last_slice;
            let header =
                RoundHeader::train(end_of_epoch, config.report_frequency, epoch, tracker.learning_scale());

            learner.start_train();
            let outcome = executor.run_round(learner, Round { indices, header })?;
            summary.rounds += 1;
            summary.discarded += outcome.discarded;
            epoch_loss += outcome.loss;
            consumed += indices.len();

            if end_of_epoch {
                learner.report_eval_point(&EvalPoint {
                    is_dev: false,
                    epoch: f64::from(epoch),
                    loss: outcome.loss,
                    new_best: false,
                });
            }

            if ctx.stop().is_requested() {
                warn!("stop requested during epoch {epoch}");
                summary.stopped_early = true;
                break 'epochs;
            }

            if !end_of_epoch && config.eval_schedule != EvalSchedule::EveryRound {
                continue;
            }
            debug!("evaluating after round {} of epoch {epoch}", i + 1);

            let fractional_epoch = f64::from(epoch - 1) + consumed as f64 / train_len as f64;
            let dev_loss = if has_dev {
                learner.start_dev();
                let header = RoundHeader::dev(config.report_frequency, epoch, tracker.learning_scale());
                let outcome = executor.run_round(learner, Round { indices: &dev_indices, header })?;
                summary.rounds += 1;
                summary.discarded += outcome.discarded;

                if ctx.stop().is_requested() {
                    warn!("stop requested during the dev pass of epoch {epoch}");
                    summary.stopped_early = true;
                    break 'epochs;
                }
                Some(outcome.loss)
            } else {
                None
            };

            let verdict = tracker.evaluate(dev_loss, end_of_epoch.then_some(epoch_loss));

            if let Some(loss) = dev_loss {
                learner.report_eval_point(&EvalPoint {
                    is_dev: true,
                    epoch: fractional_epoch,
                    loss,
                    new_best: verdict.new_best_dev,
                });
            }
            if verdict.new_best_dev {
                learner.checkpoint_dev_best()?;
            }
            if verdict.new_best_train {
                learner.checkpoint_train_best()?;
            }

            if verdict.stop {
                info!(
                    "learning scale {} fell below the threshold, stopping",
                    tracker.learning_scale()
                );
                summary.stopped_early = true;
                break 'epochs;
            }
        }
    }

    summary.best_dev = tracker.best_dev();
    summary.best_train = tracker.best_train();
    summary.learning_scale = tracker.learning_scale();

    info!(
        "run {} finished after {:.1?}: {} epoch(s), {} round(s), learning scale {}",
        ctx.run_id(),
        ctx.elapsed(),
        summary.epochs_run,
        summary.rounds,
        summary.learning_scale
    );
    Ok(summary)
}
