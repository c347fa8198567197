use std::{fmt, io};

/// Errors produced by learners when scoring or persisting fails.
#[derive(Debug)]
pub enum MlError {
    /// An input is invalid for semantic or domain reasons.
    InvalidInput(&'static str),

    /// Writing or reading a checkpoint failed.
    Checkpoint(io::Error),
}

impl fmt::Display for MlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            MlError::Checkpoint(e) => write!(f, "checkpoint failed: {e}"),
        }
    }
}

impl std::error::Error for MlError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MlError::Checkpoint(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for MlError {
    fn from(value: io::Error) -> Self {
        Self::Checkpoint(value)
    }
}
