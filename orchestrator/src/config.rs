use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::OrchestratorError;

/// The largest collection whose indices stay clear of the queue's stop sentinel.
pub const MAX_ITEMS: usize = u32::MAX as usize - 1;

/// When the dev set is evaluated and the plateau check runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvalSchedule {
    /// Once per epoch, after its last round.
    #[default]
    EveryEpoch,
    /// After every training round.
    EveryRound,
}

/// How the rounds are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    MultiProcess,
    SingleProcess,
}

/// The training loop's configuration.
///
/// Every field has a default, so a JSON file only needs to name the fields it
/// overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Amount of worker processes, ignored in single-process mode.
    pub workers: usize,
    pub epochs: u32,
    /// Amount of training items per round.
    pub round_size: usize,
    /// Amount of primary units between two progress reports.
    pub report_frequency: u32,
    /// Amount of training items between two updates, only used in single-process mode.
    pub batch_size: usize,
    /// Multiplier applied to the learning scale when the loss stops improving.
    pub rate_decay: f32,
    /// The run stops once the effective learning rate drops below this value.
    pub rate_threshold: f32,
    pub eval_schedule: EvalSchedule,
    /// Seed for the epoch permutations, drawn from the OS when missing.
    pub seed: Option<u64>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            epochs: 10,
            round_size: 1000,
            report_frequency: 100,
            batch_size: 1,
            rate_decay: 1.0,
            rate_threshold: 0.0,
            eval_schedule: EvalSchedule::EveryEpoch,
            seed: None,
        }
    }
}

impl TrainingConfig {
    /// Loads a configuration from a JSON file.
    ///
    /// # Arguments
    /// * `path` - The path of the JSON file.
    ///
    /// # Errors
    /// Returns `OrchestratorError::Io` if the file cannot be read or
    /// `OrchestratorError::InvalidConfig` if it cannot be parsed.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, OrchestratorError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parses a configuration from a JSON document.
    ///
    /// # Errors
    /// Returns `OrchestratorError::InvalidConfig` if the document cannot be parsed.
    pub fn from_json(content: &str) -> Result<Self, OrchestratorError> {
        serde_json::from_str(content)
            .map_err(|e| OrchestratorError::InvalidConfig(format!("invalid JSON: {e}")))
    }

    /// Checks the configuration against the datasets before anything is spawned.
    ///
    /// # Arguments
    /// * `mode` - How the rounds are going to be executed.
    /// * `train_len` - The size of the training set.
    /// * `dev_len` - The size of the dev set, possibly zero.
    ///
    /// # Errors
    /// Returns `OrchestratorError::InvalidConfig` describing the first invalid setting.
    pub fn validate(&self, mode: Mode, train_len: usize, dev_len: usize) -> Result<(), OrchestratorError> {
        let invalid = |msg: String| Err(OrchestratorError::InvalidConfig(msg));

        if mode == Mode::MultiProcess && self.workers == 0 {
            return invalid("workers must be greater than zero".into());
        }
        if train_len == 0 {
            return invalid("the training set must not be empty".into());
        }
        if train_len > MAX_ITEMS || dev_len > MAX_ITEMS {
            return invalid(format!("collections must hold at most {MAX_ITEMS} items"));
        }
        if self.round_size == 0 {
            return invalid("round_size must be greater than zero".into());
        }
        if self.report_frequency == 0 {
            return invalid("report_frequency must be greater than zero".into());
        }
        if mode == Mode::SingleProcess && self.batch_size == 0 {
            return invalid("batch_size must be greater than zero".into());
        }
        if !(self.rate_decay > 0.0 && self.rate_decay.is_finite()) {
            return invalid(format!("rate_decay must be positive, got {}", self.rate_decay));
        }
        if !(self.rate_threshold >= 0.0 && self.rate_threshold.is_finite()) {
            return invalid(format!(
                "rate_threshold must not be negative, got {}",
                self.rate_threshold
            ));
        }

        Ok(())
    }

    /// The work queue's capacity, large enough for a whole round plus one
    /// sentinel per worker so the orchestrator never blocks while enqueuing.
    ///
    /// # Arguments
    /// * `train_len` - The size of the training set.
    /// * `dev_len` - The size of the dev set, possibly zero.
    pub fn queue_capacity(&self, train_len: usize, dev_len: usize) -> usize {
        self.round_size.min(train_len).max(dev_len) + self.workers
    }
}
