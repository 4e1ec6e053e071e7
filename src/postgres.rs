//! Postgres transactions through sqlx
//!
//! [`PgResource`] begins transactions from a `PgPool`. The resulting [`PgTransaction`] is what
//! travels in the [`Context`](crate::Context); repository functions borrow its connection and
//! pass it to the generic-executor query functions in [`crate::domain`]:
//!
//! ```ignore
//! let tx = manager.current_transaction(&ctx).ok_or(ServiceError::NoTransaction)?;
//! let mut conn = tx.connection().await?;
//! domain::users::get_user_by_id(&mut **conn, user_id).await?;
//! ```
//!
//! The connection guard must be dropped before nested code asks for it again, otherwise the
//! second `connection()` call waits forever.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};

use crate::manager::TransactionManager;
use crate::resource::{TransactionHandle, TransactionalResource};

#[derive(Debug, thiserror::Error)]
pub enum PgError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("transaction already committed or rolled back")]
    Finished,
}

/// Transaction source backed by a connection pool.
#[derive(Debug, Clone)]
pub struct PgResource {
    pool: PgPool,
}

impl PgResource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl TransactionalResource for PgResource {
    type Handle = PgTransaction;
    type Error = PgError;

    async fn begin(&self) -> Result<PgTransaction, PgError> {
        let tx = self.pool.begin().await?;
        Ok(PgTransaction::new(tx))
    }
}

/// Borrowed access to an open transaction. `&mut **guard` is a `sqlx::Executor`.
pub type PgConnectionGuard<'a> = MappedMutexGuard<'a, Transaction<'static, Postgres>>;

/// A shared, open Postgres transaction.
///
/// Access is serialised by an async mutex; the transaction itself is not safe for concurrent
/// use.
pub struct PgTransaction {
    inner: Mutex<Option<Transaction<'static, Postgres>>>,
}

impl std::fmt::Debug for PgTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgTransaction").finish_non_exhaustive()
    }
}

impl PgTransaction {
    pub fn new(tx: Transaction<'static, Postgres>) -> Self {
        Self {
            inner: Mutex::new(Some(tx)),
        }
    }

    /// Lock the transaction for issuing queries.
    pub async fn connection(&self) -> Result<PgConnectionGuard<'_>, PgError> {
        let guard = self.inner.lock().await;
        MutexGuard::try_map(guard, |tx| tx.as_mut()).map_err(|_| PgError::Finished)
    }

    pub async fn is_finished(&self) -> bool {
        self.inner.lock().await.is_none()
    }

    async fn take(&self) -> Result<Transaction<'static, Postgres>, PgError> {
        self.inner.lock().await.take().ok_or(PgError::Finished)
    }
}

#[async_trait]
impl TransactionHandle for PgTransaction {
    type Error = PgError;

    async fn commit(&self) -> Result<(), PgError> {
        self.take().await?.commit().await?;
        Ok(())
    }

    async fn rollback(&self) -> Result<(), PgError> {
        self.take().await?.rollback().await?;
        Ok(())
    }
}

pub type PgTransactionManager = TransactionManager<PgResource>;

impl TransactionManager<PgResource> {
    /// Coordinator over a Postgres pool.
    pub fn postgres(pool: PgPool) -> Self {
        Self::new(PgResource::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        self.resource().pool()
    }
}
