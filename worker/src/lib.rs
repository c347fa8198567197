mod clock;
pub mod error;
mod metrics;
mod progress;
pub mod worker;

pub use clock::Stopwatch;
pub use error::{Result, WorkerErr};
pub use metrics::WorkerMetrics;
pub use progress::Progress;
pub use worker::Worker;
