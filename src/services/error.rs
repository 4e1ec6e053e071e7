//! Service error type and logging helpers

use std::fmt::Display;

use crate::error::TransactionError;
use crate::postgres::PgError;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("username must not be empty")]
    InvalidUsername,

    #[error("username '{0}' is already taken")]
    UsernameTaken(String),

    #[error("user {0} not found")]
    UserNotFound(i64),

    #[error("no transaction in context")]
    NoTransaction,

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Postgres(#[from] PgError),

    #[error(transparent)]
    Transaction(#[from] TransactionError<PgError>),
}

/// Extension trait for logging an error with context before passing it on
pub trait LogErr<T, E> {
    fn log_err(self, context: &str) -> Result<T, E>;
}

impl<T, E: Display> LogErr<T, E> for Result<T, E> {
    fn log_err(self, context: &str) -> Result<T, E> {
        self.map_err(|e| {
            log::error!("{}: {}", context, e);
            e
        })
    }
}
