#![allow(dead_code)]

use std::{io, ops::AddAssign};

use bytemuck::{Pod, Zeroable};
use comms::SharedCell;
use ml_core::{EvalPoint, Learner, MlError, Optimizer};
use orchestrator::StopHandle;

/// A loss remembering what it was accumulated from.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, PartialOrd, Pod, Zeroable)]
pub struct Tally {
    pub sum: f64,
    pub sum_sq: f64,
    pub count: f64,
}

impl Tally {
    pub fn of(value: f64) -> Self {
        Self {
            sum: value,
            sum_sq: value * value,
            count: 1.0,
        }
    }

    pub fn over(values: impl IntoIterator<Item = f64>) -> Self {
        let mut total = Self::default();
        for value in values {
            total += Self::of(value);
        }
        total
    }
}

impl AddAssign for Tally {
    fn add_assign(&mut self, rhs: Self) {
        self.sum += rhs.sum;
        self.sum_sq += rhs.sum_sq;
        self.count += rhs.count;
    }
}

/// Scores a datum as its own value and records the orchestrator-side callbacks.
#[derive(Default)]
pub struct Probe {
    /// Requests a stop when the n-th training round starts.
    pub stop_at_train: Option<(usize, StopHandle)>,
    /// Fails to score this datum.
    pub fail_on: Option<f64>,
    /// Makes every dev pass score worse than the previous one.
    pub dev_drift: bool,

    pub train_starts: usize,
    pub dev_starts: usize,
    pub evals: Vec<EvalPoint<Tally>>,
    pub dev_checkpoints: usize,
    pub train_checkpoints: usize,
}

impl Probe {
    pub fn dev_evals(&self) -> Vec<EvalPoint<Tally>> {
        self.evals.iter().filter(|p| p.is_dev).copied().collect()
    }

    pub fn train_evals(&self) -> Vec<EvalPoint<Tally>> {
        self.evals.iter().filter(|p| !p.is_dev).copied().collect()
    }
}

impl Learner<f64> for Probe {
    type Loss = Tally;

    fn start_train(&mut self) {
        self.train_starts += 1;
        if let Some((at, stop)) = &self.stop_at_train {
            if *at == self.train_starts {
                stop.request();
            }
        }
    }

    fn start_dev(&mut self) {
        self.dev_starts += 1;
    }

    fn score_datum(&mut self, datum: &f64, learn: bool) -> Result<Tally, MlError> {
        if self.fail_on == Some(*datum) {
            return Err(MlError::InvalidInput("poisoned datum"));
        }

        let value = if !learn && self.dev_drift {
            datum + self.dev_starts as f64
        } else {
            *datum
        };
        Ok(Tally::of(value))
    }

    fn report_eval_point(&mut self, point: &EvalPoint<Tally>) {
        self.evals.push(*point);
    }

    fn checkpoint_dev_best(&mut self) -> Result<(), MlError> {
        self.dev_checkpoints += 1;
        Ok(())
    }

    fn checkpoint_train_best(&mut self) -> Result<(), MlError> {
        self.train_checkpoints += 1;
        Ok(())
    }
}

/// Counts updates in memory shared with the worker processes.
pub struct Counting {
    pub shared_updates: SharedCell<u64>,
    pub scales: Vec<f32>,
    pub epochs: Vec<f32>,
    base_rate: f32,
}

impl Counting {
    pub fn new(base_rate: f32) -> io::Result<Self> {
        Ok(Self {
            shared_updates: SharedCell::new(0)?,
            scales: Vec::new(),
            epochs: Vec::new(),
            base_rate,
        })
    }
}

impl Optimizer for Counting {
    fn apply_update(&mut self, scale: f32) {
        self.shared_updates.update(|n| n + 1).unwrap();
        self.scales.push(scale);
    }

    fn advance_epoch(&mut self, scale: f32) {
        self.epochs.push(scale);
    }

    fn base_rate(&self) -> f32 {
        self.base_rate
    }
}

pub fn values(len: usize) -> Vec<f64> {
    (0..len).map(|i| i as f64).collect()
}
