//! Ambient transactions for layered sqlx services
//!
//! A service opens a transaction with [`TransactionManager::run_in_transaction`] and passes the
//! resulting [`Context`] down its call chain. Any function further down that calls
//! `run_in_transaction` again joins the same transaction, and repository code reaches the open
//! handle with [`TransactionManager::current_transaction`]. Only the outermost call commits or
//! rolls back.

pub mod config;
pub mod context;
pub mod domain;
pub mod error;
pub mod logging;
pub mod manager;
pub mod postgres;
pub mod resource;
pub mod services;

#[cfg(test)]
mod testing;

pub use context::{Context, ContextKey};
pub use error::TransactionError;
pub use manager::TransactionManager;
pub use postgres::{PgError, PgResource, PgTransaction, PgTransactionManager};
pub use resource::{TransactionHandle, TransactionalResource};
