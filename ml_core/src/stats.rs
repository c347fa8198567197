use std::time::Duration;

use comms::msg::RoundHeader;

/// Units of work accounted for a single datum.
///
/// What a unit is depends on the learner: a primary unit could be a sentence
/// and a secondary one a token. Progress reports are triggered on primary units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitCounts {
    primary: u64,
    secondary: u64,
}

impl UnitCounts {
    /// Creates a new `UnitCounts`.
    ///
    /// # Args
    /// * `primary` - Units used to schedule progress reports.
    /// * `secondary` - Finer grained units, only reported.
    ///
    /// # Returns
    /// A `UnitCounts` instance containing the provided counters.
    pub fn new(primary: u64, secondary: u64) -> Self {
        Self { primary, secondary }
    }

    /// Returns the primary unit count.
    pub fn primary(&self) -> u64 {
        self.primary
    }

    /// Returns the secondary unit count.
    pub fn secondary(&self) -> u64 {
        self.secondary
    }
}

impl Default for UnitCounts {
    fn default() -> Self {
        Self::new(1, 1)
    }
}

/// A periodic progress report emitted while a round is being drained.
///
/// Cumulative unit counts cover the whole round so far, `*_delta` fields cover
/// the span since the previous report of the same round. `elapsed` is the time
/// since the reporting process started training.
#[derive(Debug, Clone, Copy)]
pub struct StepReport<L> {
    pub worker_id: usize,
    pub header: RoundHeader,
    pub primary: u64,
    pub primary_delta: u64,
    pub secondary: u64,
    pub secondary_delta: u64,
    pub elapsed: Duration,
    pub elapsed_delta: Duration,
    pub loss_delta: L,
}
