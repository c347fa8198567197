/// The model update rule, as seen by the training loops.
///
/// The loops never compute gradients nor touch parameters. They only decide
/// *when* an update happens and with which multiplier.
pub trait Optimizer {
    /// Applies the pending update, scaled by `scale`.
    ///
    /// In multi-process mode this runs inside the update critical section, so
    /// it is never executed by two workers at the same time.
    fn apply_update(&mut self, scale: f32);

    /// End of epoch hook (e.g. learning rate schedules).
    ///
    /// # Args
    /// * `scale` - The share of the epoch hook owned by the caller. `1.0` when
    ///   training in a single process, `1 / workers` for each worker otherwise.
    fn advance_epoch(&mut self, scale: f32);

    /// The base learning rate, used to turn the configured rate threshold into
    /// a learning scale threshold.
    fn base_rate(&self) -> f32;
}
