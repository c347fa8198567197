use log::info;

use crate::{LossMetric, MlError, StepReport, UnitCounts};

/// A loss observed at an evaluation point of the training loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvalPoint<L> {
    /// Whether the loss was measured on the dev set.
    pub is_dev: bool,
    /// The fractional epoch the loss was measured at (e.g. `2.5` is halfway
    /// through the third epoch).
    pub epoch: f64,
    pub loss: L,
    /// Whether the loss improved on every loss of the same kind seen before.
    pub new_best: bool,
}

/// Abstraction over the per-datum computation executed by the training loops.
///
/// Implementations encapsulate all model-, data-, and loss-specific logic.
/// The loops treat this trait as a black box that maps a datum to a loss,
/// and call back into it at the points where observability or persistence
/// may be needed. Every method but `score_datum` has a usable default.
///
/// In multi-process mode every worker runs on its own forked copy of the
/// learner, so state that must be visible to all workers (e.g. the model's
/// parameters) has to live in shared memory.
pub trait Learner<D> {
    /// The accumulated loss type.
    type Loss: LossMetric;

    /// Called before every training round.
    fn start_train(&mut self) {}

    /// Called before every dev round.
    fn start_dev(&mut self) {}

    /// Scores a single datum.
    ///
    /// # Args
    /// * `datum` - The dataset item to score.
    /// * `learn` - Whether the datum belongs to a training round, in which case
    ///   the learner should also accumulate whatever the next update needs.
    ///
    /// # Returns
    /// The datum's loss.
    ///
    /// # Errors
    /// Implementations should return `MlError::InvalidInput` for invalid domain
    /// inputs and `MlError::Checkpoint` for I/O failures.
    fn score_datum(&mut self, datum: &D, learn: bool) -> Result<Self::Loss, MlError>;

    /// The units of work a datum accounts for.
    fn unit_counts(&self, _datum: &D) -> UnitCounts {
        UnitCounts::default()
    }

    /// Receives a progress report. By default only the first worker's reports
    /// are logged.
    fn report_step(&mut self, report: &StepReport<Self::Loss>) {
        if report.worker_id != 0 {
            return;
        }

        let secs = report.elapsed_delta.as_secs_f64();
        let rate = if secs > 0.0 {
            report.secondary_delta as f64 / secs
        } else {
            0.0
        };

        info!(
            epoch = report.header.epoch, dev = report.header.is_dev;
            "units={} loss={:?} ({rate:.1} units/s)",
            report.primary,
            report.loss_delta
        );
    }

    /// Receives a train or dev loss measured at an evaluation point.
    fn report_eval_point(&mut self, point: &EvalPoint<Self::Loss>) {
        let kind = if point.is_dev { "dev" } else { "train" };
        info!(
            new_best = point.new_best;
            "{kind} loss at epoch {:.2}: {:?}",
            point.epoch,
            point.loss
        );
    }

    /// Persists the model after a new best dev loss.
    ///
    /// # Errors
    /// Returns `MlError::Checkpoint` if the model could not be persisted.
    fn checkpoint_dev_best(&mut self) -> Result<(), MlError> {
        Ok(())
    }

    /// Persists the model after a new best train loss.
    ///
    /// # Errors
    /// Returns `MlError::Checkpoint` if the model could not be persisted.
    fn checkpoint_train_best(&mut self) -> Result<(), MlError> {
        Ok(())
    }
}
