use std::time::Duration;

/// Counters accumulated by a worker over its whole lifetime.
#[derive(Debug, Default, Clone)]
pub struct WorkerMetrics {
    pub busy_time: Duration,

    pub train_rounds: u64,
    pub dev_rounds: u64,
    pub items: u64,
    pub updates: u64,
}

impl WorkerMetrics {
    #[inline]
    pub fn bump_round(&mut self, is_dev: bool) {
        if is_dev {
            self.dev_rounds += 1;
        } else {
            self.train_rounds += 1;
        }
    }

    #[inline]
    pub fn bump_item(&mut self) {
        self.items += 1;
    }

    #[inline]
    pub fn bump_update(&mut self) {
        self.updates += 1;
    }
}
