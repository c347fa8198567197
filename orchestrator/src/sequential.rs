use std::time::Instant;

use ml_core::{Learner, Optimizer};
use worker::Progress;

use crate::{
    OrchestratorError, StopHandle,
    executor::{Round, RoundExecutor, RoundOutcome},
};

/// Scores rounds in the calling process.
///
/// The model is updated every `batch_size` training items, counting across
/// round boundaries.
pub struct Sequential<'a, D, O> {
    train: &'a [D],
    dev: &'a [D],
    optimizer: &'a mut O,
    batch_size: usize,
    pending: usize,
    stop: StopHandle,
    started: Instant,
}

impl<'a, D, O: Optimizer> Sequential<'a, D, O> {
    /// Creates a new `Sequential` executor.
    ///
    /// # Arguments
    /// * `train` - The training set.
    /// * `dev` - The dev set, possibly empty.
    /// * `optimizer` - The model's update rule.
    /// * `batch_size` - Amount of training items between two updates.
    /// * `stop` - The run's stop handle.
    /// * `started` - When the run started, progress reports are relative to it.
    pub fn new(
        train: &'a [D],
        dev: &'a [D],
        optimizer: &'a mut O,
        batch_size: usize,
        stop: StopHandle,
        started: Instant,
    ) -> Self {
        Self {
            train,
            dev,
            optimizer,
            batch_size,
            pending: 0,
            stop,
            started,
        }
    }

    fn resolve(&self, index: u32, is_dev: bool) -> Result<&'a D, OrchestratorError> {
        let data = if is_dev { self.dev } else { self.train };
        data.get(index as usize).ok_or(OrchestratorError::IndexOutOfRange {
            index,
            len: data.len(),
            is_dev,
        })
    }
}

impl<D, L, O> RoundExecutor<D, L> for Sequential<'_, D, O>
where
    L: Learner<D>,
    O: Optimizer,
{
    fn run_round(&mut self, learner: &mut L, round: Round<'_>) -> Result<RoundOutcome<L::Loss>, OrchestratorError> {
        let Round { indices, header } = round;
        let learn = !header.is_dev;
        let mut loss = L::Loss::default();
        let mut progress = Progress::new(header.report_frequency, self.started);
        let mut scored = 0;

        for &index in indices {
            if self.stop.is_requested() {
                break;
            }

            let datum = self.resolve(index, header.is_dev)?;
            let datum_loss = learner.score_datum(datum, learn)?;
            loss += datum_loss;
            scored += 1;

            if learn {
                self.pending += 1;
                if self.pending == self.batch_size {
                    self.optimizer.apply_update(header.learning_scale);
                    self.pending = 0;
                }
            }

            if progress.record(learner.unit_counts(datum), datum_loss) {
                learner.report_step(&progress.take_report(0, header));
            }
        }

        if header.end_of_epoch && !self.stop.is_requested() {
            self.optimizer.advance_epoch(1.0);
        }

        Ok(RoundOutcome {
            loss,
            discarded: (indices.len() - scored) as u64,
        })
    }
}
