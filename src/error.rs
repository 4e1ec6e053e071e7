//! Failures raised by the transaction boundary itself
//!
//! A failure of the wrapped work is never wrapped: it reaches the caller as the caller's own
//! error type. [`TransactionError`] only describes what went wrong around the work, and callers
//! fold it into their error type with a `From` impl.

use std::error::Error as StdError;

pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum TransactionError<D>
where
    D: StdError + 'static,
{
    /// The underlying resource could not open a transaction.
    #[error("failed to begin transaction: {0}")]
    Begin(#[source] D),

    /// The work succeeded but the resource failed to persist it.
    #[error("failed to commit transaction: {0}")]
    Commit(#[source] D),

    /// The work failed and the rollback that followed failed too. Both are kept: the rollback
    /// failure is the `source`, the work failure is available through
    /// [`TransactionError::work_error`].
    #[error("failed to roll back transaction after work failed ({work}): {source}")]
    Rollback {
        #[source]
        source: D,
        work: BoxError,
    },
}

impl<D> TransactionError<D>
where
    D: StdError + 'static,
{
    pub fn is_begin(&self) -> bool {
        matches!(self, Self::Begin(_))
    }

    pub fn is_commit(&self) -> bool {
        matches!(self, Self::Commit(_))
    }

    pub fn is_rollback(&self) -> bool {
        matches!(self, Self::Rollback { .. })
    }

    /// The error reported by the underlying resource.
    pub fn resource_error(&self) -> &D {
        match self {
            Self::Begin(e) | Self::Commit(e) => e,
            Self::Rollback { source, .. } => source,
        }
    }

    /// The original work failure, when the rollback that followed it also failed.
    pub fn work_error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        match self {
            Self::Rollback { work, .. } => Some(work.as_ref()),
            _ => None,
        }
    }
}
