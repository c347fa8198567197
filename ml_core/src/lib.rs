mod error;
mod learner;
mod loss;
mod optimizer;
mod stats;

pub use error::MlError;
pub use learner::{EvalPoint, Learner};
pub use loss::LossMetric;
pub use optimizer::Optimizer;
pub use stats::{StepReport, UnitCounts};
