use comms::msg::RoundHeader;
use ml_core::Learner;

use crate::OrchestratorError;

/// A slice of dataset indices to score under a single header.
#[derive(Debug, Clone, Copy)]
pub struct Round<'a> {
    pub indices: &'a [u32],
    pub header: RoundHeader,
}

/// The result of running a round.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoundOutcome<L> {
    /// The loss accumulated over every scored item.
    pub loss: L,
    /// Items of the round left unscored because a stop was requested.
    pub discarded: u64,
}

/// Runs rounds on behalf of the training loop.
///
/// Both execution modes share the exact same training loop, they only differ
/// in how a round of indices gets scored.
pub trait RoundExecutor<D, L: Learner<D>> {
    /// Scores every index of the round, or as many as possible if a stop gets
    /// requested in the middle of it.
    ///
    /// # Arguments
    /// * `learner` - The orchestrator's learner, executors scoring in other
    ///   processes leave it untouched.
    /// * `round` - The indices and their header.
    ///
    /// # Returns
    /// The round's accumulated loss.
    ///
    /// # Errors
    /// Returns `OrchestratorError` if any item could not be scored.
    fn run_round(&mut self, learner: &mut L, round: Round<'_>) -> Result<RoundOutcome<L::Loss>, OrchestratorError>;
}
