//! Multi-process data-parallel training loops.
//!
//! - [`comms`]: the control channel, work queue and gate shared by the processes.
//! - [`ml_core`]: the learner and optimizer contracts.
//! - [`worker`]: the loop run by every worker process.
//! - [`orchestrator`]: the training loop, in a single process or across workers.
//! - [`regression`]: a linear regression over shared memory, trained by the demo binary.

pub mod regression;

pub use comms;
pub use ml_core;
pub use orchestrator;
pub use worker;
