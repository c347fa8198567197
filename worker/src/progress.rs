use std::time::Instant;

use comms::msg::RoundHeader;
use ml_core::{LossMetric, StepReport, UnitCounts};

use crate::Stopwatch;

/// Tracks the progress of a round and decides when a step report is due.
///
/// A report is due every time the cumulative primary unit count crosses a
/// multiple of the report frequency. A frequency of zero disables reports.
#[derive(Debug)]
pub struct Progress<L> {
    frequency: u64,
    primary: u64,
    secondary: u64,
    primary_delta: u64,
    secondary_delta: u64,
    loss_delta: L,
    started: Instant,
    clock: Stopwatch,
}

impl<L: LossMetric> Progress<L> {
    /// Starts tracking a round.
    ///
    /// # Args
    /// * `report_frequency` - Amount of primary units between two reports.
    /// * `started` - When the reporting process started training, reports
    ///   carry the time elapsed since then.
    pub fn new(report_frequency: u32, started: Instant) -> Self {
        Self {
            frequency: u64::from(report_frequency),
            primary: 0,
            secondary: 0,
            primary_delta: 0,
            secondary_delta: 0,
            loss_delta: L::default(),
            started,
            clock: Stopwatch::start(),
        }
    }

    /// Accounts for a scored datum.
    ///
    /// # Returns
    /// Whether a report is due after this datum.
    pub fn record(&mut self, units: UnitCounts, loss: L) -> bool {
        let before = self.primary;
        self.primary += units.primary();
        self.secondary += units.secondary();
        self.primary_delta += units.primary();
        self.secondary_delta += units.secondary();
        self.loss_delta += loss;

        match (before.checked_div(self.frequency), self.primary.checked_div(self.frequency)) {
            (Some(prev), Some(curr)) => prev != curr,
            _ => false,
        }
    }

    /// Builds a report of the round so far and resets the deltas.
    pub fn take_report(&mut self, worker_id: usize, header: RoundHeader) -> StepReport<L> {
        let report = StepReport {
            worker_id,
            header,
            primary: self.primary,
            primary_delta: self.primary_delta,
            secondary: self.secondary,
            secondary_delta: self.secondary_delta,
            elapsed: self.started.elapsed(),
            elapsed_delta: self.clock.lap(),
            loss_delta: self.loss_delta,
        };

        self.primary_delta = 0;
        self.secondary_delta = 0;
        self.loss_delta = L::default();
        report
    }
}
