use std::{error::Error, fmt, io};

use ml_core::MlError;

/// The worker module's result type.
pub type Result<T> = std::result::Result<T, WorkerErr>;

/// Worker runtime failures.
#[derive(Debug)]
pub enum WorkerErr {
    Io(io::Error),
    IndexOutOfRange { index: u32, len: usize, is_dev: bool },
    Learner(MlError),
}

impl fmt::Display for WorkerErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerErr::Io(e) => write!(f, "io error: {e}"),
            WorkerErr::IndexOutOfRange { index, len, is_dev } => {
                let set = if *is_dev { "dev" } else { "train" };
                write!(f, "index {index} out of range for {set} set of length {len}")
            }
            WorkerErr::Learner(e) => write!(f, "learner error: {e}"),
        }
    }
}

impl Error for WorkerErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            WorkerErr::Io(e) => Some(e),
            WorkerErr::Learner(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for WorkerErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<MlError> for WorkerErr {
    fn from(value: MlError) -> Self {
        Self::Learner(value)
    }
}

/// Boundary conversion for callers working with `io::Result`.
impl From<WorkerErr> for io::Error {
    fn from(value: WorkerErr) -> Self {
        match value {
            WorkerErr::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
