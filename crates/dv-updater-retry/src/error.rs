use thiserror::Error;

use crate::config::RetryPolicy;

#[derive(Error, Debug)]
pub enum RetryError<E> {
    #[error("{policy} retry failed after {attempts} attempts")]
    Exhausted {
        policy: RetryPolicy,
        attempts: u32,
        #[source]
        last: Option<E>,
    },

    #[error("{0}")]
    Aborted(E),

    #[error("{policy} retry cancelled after {attempts} attempts")]
    Cancelled { policy: RetryPolicy, attempts: u32 },

    #[error("infinite retry cannot run without a cancellation token")]
    MissingCancellationToken,

    #[error("retry task failed: {0}")]
    TaskFailed(String),
}

impl<E> RetryError<E> {
    /// The operation's own error, when the retry ended because of one.
    pub fn into_cause(self) -> Option<E> {
        match self {
            RetryError::Aborted(err) => Some(err),
            RetryError::Exhausted { last, .. } => last,
            _ => None,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled { .. })
    }
}

pub type RetryResult<T, E> = std::result::Result<T, RetryError<E>>;
