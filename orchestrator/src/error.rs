use std::{fmt, io};

use ml_core::MlError;

/// All errors that can occur in the orchestrator.
#[derive(Debug)]
pub enum OrchestratorError {
    /// Invalid configuration, caught before spawning any worker.
    InvalidConfig(String),
    /// A worker's control channel broke in the middle of the run.
    WorkerLost { worker_id: usize, source: io::Error },
    /// A worker process exited with a failure status.
    WorkerFailed { worker_id: usize, status: String },
    /// A dataset index outside of its collection, only reachable in single-process mode.
    IndexOutOfRange { index: u32, len: usize, is_dev: bool },
    /// The learner failed to score a datum or to checkpoint the model.
    Learner(MlError),
    /// An underlying I/O error not covered by the above variants.
    Io(io::Error),
}

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Self::WorkerLost { worker_id, source } => {
                write!(f, "lost worker {worker_id}: {source}")
            }
            Self::WorkerFailed { worker_id, status } => {
                write!(f, "worker {worker_id} failed: {status}")
            }
            Self::IndexOutOfRange { index, len, is_dev } => {
                let set = if *is_dev { "dev" } else { "train" };
                write!(f, "index {index} out of range for {set} set of length {len}")
            }
            Self::Learner(e) => write!(f, "learner error: {e}"),
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for OrchestratorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::WorkerLost { source, .. } => Some(source),
            Self::Learner(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for OrchestratorError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<MlError> for OrchestratorError {
    fn from(e: MlError) -> Self {
        Self::Learner(e)
    }
}
