use gpgkms_core::{ErrorKind, GpgKmsError};
use std::fmt;

/// A workflow failure: the component error, unchanged, plus the last state
/// the workflow reached before it failed.
#[derive(Debug, thiserror::Error)]
#[error("failed after {last_state}: {source}")]
pub struct WorkflowError<S>
where
    S: fmt::Debug + fmt::Display,
{
    pub last_state: S,
    #[source]
    pub source: GpgKmsError,
}

impl<S> WorkflowError<S>
where
    S: fmt::Debug + fmt::Display,
{
    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }

    pub fn is_retryable(&self) -> bool {
        self.source.is_retryable()
    }
}
