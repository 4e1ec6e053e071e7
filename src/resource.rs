//! Seam to the underlying transactional engine
//!
//! The coordinator never talks to a database directly. It asks a [`TransactionalResource`] for
//! a new handle and later tells that handle to commit or roll back.

use async_trait::async_trait;

/// Source of new transactions, e.g. a connection pool.
#[async_trait]
pub trait TransactionalResource: Send + Sync + 'static {
    type Handle: TransactionHandle<Error = Self::Error>;
    type Error: std::error::Error + Send + Sync + 'static;

    async fn begin(&self) -> Result<Self::Handle, Self::Error>;
}

/// An open transaction.
///
/// The coordinator calls exactly one of `commit` or `rollback`, exactly once, and only from the
/// invocation that began the transaction. Nested code holds a shared reference to the handle,
/// which is why both take `&self`.
#[async_trait]
pub trait TransactionHandle: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn commit(&self) -> Result<(), Self::Error>;

    async fn rollback(&self) -> Result<(), Self::Error>;
}
