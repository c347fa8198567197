use log::{debug, info};
use ml_core::LossMetric;

/// The decisions taken at an evaluation point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Verdict {
    /// The dev loss beats every dev loss seen before, checkpoint the model.
    pub new_best_dev: bool,
    /// The epoch's train loss beats every epoch seen before, checkpoint the model.
    pub new_best_train: bool,
    /// The tracked loss didn't improve and the learning scale was decayed.
    pub decayed: bool,
    /// The learning scale fell below the threshold, the run must stop.
    pub stop: bool,
}

/// Best-so-far bookkeeping and learning scale decay.
///
/// The tracked loss is the dev loss when a dev set exists, the epoch's train
/// loss otherwise. Whenever it fails to improve on the previous one the
/// learning scale is multiplied by the decay, and once it drops below the
/// threshold the run is asked to stop.
#[derive(Debug, Clone)]
pub struct ConvergenceTracker<L> {
    rate_decay: f32,
    scale_threshold: f32,
    learning_scale: f32,
    best_dev: Option<L>,
    best_train: Option<L>,
    last: Option<L>,
}

impl<L: LossMetric> ConvergenceTracker<L> {
    /// Creates a new tracker with a learning scale of `1.0`.
    ///
    /// # Arguments
    /// * `rate_decay` - Multiplier applied to the learning scale on a plateau.
    /// * `scale_threshold` - The smallest learning scale allowed to keep training.
    pub fn new(rate_decay: f32, scale_threshold: f32) -> Self {
        Self {
            rate_decay,
            scale_threshold,
            learning_scale: 1.0,
            best_dev: None,
            best_train: None,
            last: None,
        }
    }

    /// Creates a tracker whose threshold is given as a learning rate.
    ///
    /// # Arguments
    /// * `rate_decay` - Multiplier applied to the learning scale on a plateau.
    /// * `rate_threshold` - The smallest effective learning rate allowed.
    /// * `base_rate` - The optimizer's learning rate at a scale of `1.0`.
    pub fn with_rate_threshold(rate_decay: f32, rate_threshold: f32, base_rate: f32) -> Self {
        let scale_threshold = if rate_threshold > 0.0 {
            rate_threshold / base_rate
        } else {
            0.0
        };
        Self::new(rate_decay, scale_threshold)
    }

    pub fn learning_scale(&self) -> f32 {
        self.learning_scale
    }

    pub fn best_dev(&self) -> Option<L> {
        self.best_dev
    }

    pub fn best_train(&self) -> Option<L> {
        self.best_train
    }

    /// Whether `loss` beats the given best, the first loss always does.
    pub fn improves(loss: &L, best: Option<&L>) -> bool {
        best.is_none_or(|best| loss < best)
    }

    /// Evaluates the losses measured at an evaluation point.
    ///
    /// # Arguments
    /// * `dev` - The dev loss, if a dev set exists.
    /// * `train` - The epoch's train loss, only given at the end of an epoch.
    ///
    /// # Returns
    /// The verdict the training loop has to act upon.
    pub fn evaluate(&mut self, dev: Option<L>, train: Option<L>) -> Verdict {
        let mut verdict = Verdict {
            new_best_dev: dev.is_some_and(|dev| Self::improves(&dev, self.best_dev.as_ref())),
            new_best_train: train.is_some_and(|train| Self::improves(&train, self.best_train.as_ref())),
            ..Verdict::default()
        };

        let tracked = dev.or(train);
        if let (Some(current), Some(last)) = (tracked, self.last) {
            if !(current < last) {
                self.learning_scale *= self.rate_decay;
                verdict.decayed = true;
                verdict.stop = self.learning_scale < self.scale_threshold;
                info!(
                    "loss didn't improve ({current:?} vs {last:?}), learning scale decayed to {}",
                    self.learning_scale
                );
            }
        }

        if verdict.new_best_dev {
            self.best_dev = dev;
        }
        if verdict.new_best_train {
            self.best_train = train;
        }
        if !verdict.stop && tracked.is_some() {
            self.last = tracked;
        }

        debug!("{verdict:?}");
        verdict
    }
}
