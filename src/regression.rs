use std::{cmp::Ordering, fs::File, io, ops::AddAssign, path::PathBuf};

use bytemuck::{Pod, Zeroable};
use comms::SharedCell;
use log::{error, info};
use ml_core::{Learner, MlError, Optimizer};
use rand::Rng;
use serde::Serialize;

pub const FEATURES: usize = 2;

/// A labeled point.
#[derive(Debug, Clone, Copy)]
pub struct Sample {
    pub x: [f32; FEATURES],
    pub y: f32,
}

/// Samples `len` noisy points of `y = w·x + b`.
pub fn synthetic<R: Rng>(rng: &mut R, len: usize, w: [f32; FEATURES], b: f32) -> Vec<Sample> {
    (0..len)
        .map(|_| {
            let x = [rng.random_range(-1.0..1.0), rng.random_range(-1.0..1.0)];
            let noise: f32 = rng.random_range(-0.05..0.05);
            let y = w[0] * x[0] + w[1] * x[1] + b + noise;
            Sample { x, y }
        })
        .collect()
}

/// Squared error summed over a set of samples.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SquaredError {
    pub total: f64,
    pub samples: f64,
}

impl SquaredError {
    pub fn mean(&self) -> f64 {
        if self.samples > 0.0 {
            self.total / self.samples
        } else {
            0.0
        }
    }
}

impl AddAssign for SquaredError {
    fn add_assign(&mut self, rhs: Self) {
        self.total += rhs.total;
        self.samples += rhs.samples;
    }
}

impl PartialOrd for SquaredError {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.mean().partial_cmp(&other.mean())
    }
}

/// `[w0, w1, b]`
type Params = [f32; FEATURES + 1];

/// Gradient sums followed by the amount of samples they add up.
type Grads = [f32; FEATURES + 2];

/// A linear model living in memory shared by every worker process.
pub struct Model {
    params: SharedCell<Params>,
    grads: SharedCell<Grads>,
    rate: SharedCell<f32>,
}

impl Model {
    pub fn new(base_rate: f32) -> io::Result<Self> {
        Ok(Self {
            params: SharedCell::new([0.0; FEATURES + 1])?,
            grads: SharedCell::new([0.0; FEATURES + 2])?,
            rate: SharedCell::new(base_rate)?,
        })
    }

    pub fn params(&self) -> io::Result<Params> {
        self.params.get()
    }

    fn predict(params: &Params, x: &[f32; FEATURES]) -> f32 {
        params[0] * x[0] + params[1] * x[1] + params[2]
    }
}

#[derive(Serialize)]
struct Checkpoint {
    weights: [f32; FEATURES],
    bias: f32,
}

/// Scores samples with the shared model, accumulating gradients while learning.
pub struct Regression<'m> {
    model: &'m Model,
    checkpoint_dir: Option<PathBuf>,
}

impl<'m> Regression<'m> {
    pub fn new(model: &'m Model, checkpoint_dir: Option<PathBuf>) -> Self {
        Self {
            model,
            checkpoint_dir,
        }
    }

    fn checkpoint(&self, name: &str) -> Result<(), MlError> {
        let params = self.model.params()?;
        let Some(dir) = &self.checkpoint_dir else {
            info!("new best model {params:?}");
            return Ok(());
        };

        let path = dir.join(name);
        let file = File::create(&path)?;
        let checkpoint = Checkpoint {
            weights: [params[0], params[1]],
            bias: params[2],
        };
        serde_json::to_writer_pretty(file, &checkpoint).map_err(io::Error::from)?;
        info!("saved {}", path.display());
        Ok(())
    }
}

impl Learner<Sample> for Regression<'_> {
    type Loss = SquaredError;

    fn score_datum(&mut self, datum: &Sample, learn: bool) -> Result<SquaredError, MlError> {
        if !datum.y.is_finite() || datum.x.iter().any(|x| !x.is_finite()) {
            return Err(MlError::InvalidInput("non finite sample"));
        }

        let params = self.model.params()?;
        let err = Model::predict(&params, &datum.x) - datum.y;

        if learn {
            self.model.grads.update(|mut grads| {
                grads[0] += 2.0 * err * datum.x[0];
                grads[1] += 2.0 * err * datum.x[1];
                grads[2] += 2.0 * err;
                grads[3] += 1.0;
                grads
            })?;
        }

        Ok(SquaredError {
            total: f64::from(err * err),
            samples: 1.0,
        })
    }

    fn checkpoint_dev_best(&mut self) -> Result<(), MlError> {
        self.checkpoint("dev_best.json")
    }

    fn checkpoint_train_best(&mut self) -> Result<(), MlError> {
        self.checkpoint("train_best.json")
    }
}

/// Plain gradient descent over the mean of the gradients accumulated since
/// the previous update.
pub struct Sgd<'m> {
    model: &'m Model,
    base_rate: f32,
    epoch_decay: f32,
}

impl<'m> Sgd<'m> {
    pub fn new(model: &'m Model, base_rate: f32, epoch_decay: f32) -> Self {
        Self {
            model,
            base_rate,
            epoch_decay,
        }
    }

    fn try_update(&mut self, scale: f32) -> io::Result<()> {
        let grads = self.model.grads.replace([0.0; FEATURES + 2])?;
        let samples = grads[FEATURES + 1];
        if samples == 0.0 {
            return Ok(());
        }

        let step = self.model.rate.get()? * scale / samples;
        self.model.params.update(|mut params| {
            for (p, g) in params.iter_mut().zip(grads) {
                *p -= step * g;
            }
            params
        })?;
        Ok(())
    }
}

impl Optimizer for Sgd<'_> {
    fn apply_update(&mut self, scale: f32) {
        if let Err(e) = self.try_update(scale) {
            error!("failed to update the model: {e}");
        }
    }

    /// Decays the shared rate by `epoch_decay ^ scale`, so fractions of an
    /// epoch reported by different workers compose into a whole one.
    fn advance_epoch(&mut self, scale: f32) {
        let decay = self.epoch_decay.powf(scale);
        if let Err(e) = self.model.rate.update(|rate| rate * decay) {
            error!("failed to decay the learning rate: {e}");
        }
    }

    fn base_rate(&self) -> f32 {
        self.base_rate
    }
}
