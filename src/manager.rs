//! Transaction coordinator
//!
//! [`TransactionManager::run_in_transaction`] decides once per call whether it owns a
//! transaction. The outermost call begins one, stores it in the [`Context`] handed to the work,
//! and commits or rolls back when the work returns. Calls further down the chain find the
//! handle in their context and simply run their work inside it.
//!
//! ```ignore
//! let manager = TransactionManager::new(PgResource::new(pool));
//!
//! manager
//!     .run_in_transaction(&ctx, |ctx| async move {
//!         let tx = manager.current_transaction(&ctx).ok_or(ServiceError::NoTransaction)?;
//!         let mut conn = tx.connection().await?;
//!         domain::users::insert_user(&mut **conn, "alice").await?;
//!         Ok(())
//!     })
//!     .await?;
//! ```

use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::context::{Context, ContextKey};
use crate::error::TransactionError;
use crate::resource::{TransactionHandle, TransactionalResource};

struct Inner<R: TransactionalResource> {
    resource: R,
    key: ContextKey<R::Handle>,
}

/// Begins, shares and terminates transactions on behalf of a call chain.
///
/// The context key is process-wide per handle type: any manager over the same kind of resource
/// finds a handle stored by another one and joins its transaction.
pub struct TransactionManager<R: TransactionalResource> {
    inner: Arc<Inner<R>>,
}

impl<R: TransactionalResource> Clone for TransactionManager<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: TransactionalResource> fmt::Debug for TransactionManager<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionManager")
            .field("key", &self.inner.key)
            .finish()
    }
}

impl<R: TransactionalResource> TransactionManager<R> {
    pub fn new(resource: R) -> Self {
        Self {
            inner: Arc::new(Inner {
                resource,
                key: ContextKey::for_type("txscope.transaction"),
            }),
        }
    }

    /// The underlying resource, for work that should not join any transaction.
    pub fn resource(&self) -> &R {
        &self.inner.resource
    }

    /// The transaction carried by `ctx`, if this manager put one there.
    ///
    /// Repository code uses this to issue queries. It never commits or rolls back.
    pub fn current_transaction(&self, ctx: &Context) -> Option<Arc<R::Handle>> {
        ctx.value(&self.inner.key)
    }

    pub fn in_transaction(&self, ctx: &Context) -> bool {
        self.current_transaction(ctx).is_some()
    }

    /// Run `work` inside a transaction.
    ///
    /// If `ctx` already carries a transaction from this manager, `work` runs with `ctx` as is and
    /// its result is returned untouched. Otherwise a new transaction is begun, `work` runs with a
    /// child context carrying it, and the transaction is committed if `work` succeeds or rolled
    /// back if it fails.
    ///
    /// The work's own error is returned unchanged. Begin and commit failures are converted into
    /// `E` from [`TransactionError`]. A failed rollback is converted as
    /// [`TransactionError::Rollback`], which keeps the work error.
    pub async fn run_in_transaction<T, E, F, Fut>(&self, ctx: &Context, work: F) -> Result<T, E>
    where
        F: FnOnce(Context) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<TransactionError<R::Error>> + StdError + Send + Sync + 'static,
    {
        if self.in_transaction(ctx) {
            log::trace!("joining ambient transaction");
            return work(ctx.clone()).await;
        }

        let handle = self
            .inner
            .resource
            .begin()
            .await
            .map(Arc::new)
            .map_err(TransactionError::Begin)?;
        log::debug!("transaction started");

        let scoped = ctx.with_shared(&self.inner.key, Arc::clone(&handle));

        match work(scoped).await {
            Ok(value) => {
                handle.commit().await.map_err(TransactionError::Commit)?;
                log::debug!("transaction committed");
                Ok(value)
            }
            Err(err) => match handle.rollback().await {
                Ok(()) => {
                    log::debug!("transaction rolled back");
                    Err(err)
                }
                Err(source) => Err(TransactionError::Rollback {
                    source,
                    work: Box::new(err),
                }
                .into()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingResource, TestDbError};
    use std::pin::Pin;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Debug, thiserror::Error)]
    enum AppError {
        #[error("not found: {0}")]
        NotFound(&'static str),
        #[error(transparent)]
        Transaction(#[from] TransactionError<TestDbError>),
    }

    type Manager = TransactionManager<RecordingResource>;

    fn nested(
        manager: Manager,
        ctx: Context,
        depth: usize,
        fail_at_leaf: bool,
    ) -> Pin<Box<dyn Future<Output = Result<usize, AppError>> + Send>> {
        Box::pin(async move {
            let inner = manager.clone();
            manager
                .run_in_transaction(&ctx, move |ctx| async move {
                    if depth == 0 {
                        if fail_at_leaf {
                            return Err(AppError::NotFound("leaf"));
                        }
                        let handle = inner.current_transaction(&ctx).expect("leaf sees handle");
                        return Ok(handle.id());
                    }
                    nested(inner, ctx, depth - 1, fail_at_leaf).await
                })
                .await
        })
    }

    #[tokio::test]
    async fn owner_commits_once_on_success() {
        let resource = RecordingResource::default();
        let manager = Manager::new(resource.clone());

        let value = manager
            .run_in_transaction(&Context::new(), |_ctx| async { Ok::<_, AppError>(42) })
            .await
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(resource.begins(), 1);
        assert_eq!(resource.commits(), 1);
        assert_eq!(resource.rollbacks(), 0);
    }

    #[tokio::test]
    async fn deep_nesting_commits_exactly_once() {
        let resource = RecordingResource::default();
        let manager = Manager::new(resource.clone());

        let handle_id = nested(manager, Context::new(), 5, false).await.unwrap();

        assert_eq!(handle_id, 1);
        assert_eq!(resource.begins(), 1);
        assert_eq!(resource.commits(), 1);
        assert_eq!(resource.rollbacks(), 0);
    }

    #[tokio::test]
    async fn leaf_failure_propagates_unchanged_and_rolls_back_once() {
        let resource = RecordingResource::default();
        let manager = Manager::new(resource.clone());

        let err = nested(manager, Context::new(), 2, true).await.unwrap_err();

        assert!(matches!(err, AppError::NotFound("leaf")));
        assert_eq!(resource.begins(), 1);
        assert_eq!(resource.rollbacks(), 1);
        assert_eq!(resource.commits(), 0);
    }

    #[tokio::test]
    async fn nested_call_sees_the_owner_handle() {
        let resource = RecordingResource::default();
        let manager = Manager::new(resource.clone());
        let outer = manager.clone();

        manager
            .run_in_transaction(&Context::new(), move |ctx| async move {
                let owner = outer.current_transaction(&ctx).expect("owner handle");
                let joiner = outer.clone();
                outer
                    .run_in_transaction(&ctx, move |inner_ctx| async move {
                        let seen = joiner.current_transaction(&inner_ctx).expect("nested handle");
                        assert!(Arc::ptr_eq(&owner, &seen));
                        Ok::<_, AppError>(())
                    })
                    .await
            })
            .await
            .unwrap();

        assert_eq!(resource.begins(), 1);
    }

    #[tokio::test]
    async fn handled_nested_failure_still_commits() {
        let resource = RecordingResource::default();
        let manager = Manager::new(resource.clone());
        let outer = manager.clone();

        manager
            .run_in_transaction(&Context::new(), move |ctx| async move {
                let nested = outer
                    .run_in_transaction(&ctx, |_| async { Err::<(), _>(AppError::NotFound("row")) })
                    .await;
                assert!(nested.is_err());
                Ok::<_, AppError>(())
            })
            .await
            .unwrap();

        assert_eq!(resource.commits(), 1);
        assert_eq!(resource.rollbacks(), 0);
    }

    #[tokio::test]
    async fn current_transaction_is_absent_outside_a_transaction() {
        let manager = Manager::new(RecordingResource::default());
        let ctx = Context::new();
        assert!(manager.current_transaction(&ctx).is_none());
        assert!(!manager.in_transaction(&ctx));
    }

    #[tokio::test]
    async fn mistyped_entry_is_treated_as_absent() {
        let resource = RecordingResource::default();
        let manager = Manager::new(resource.clone());
        let ctx = Context::new().with_untyped(&manager.inner.key, "not a handle");

        assert!(manager.current_transaction(&ctx).is_none());

        let inner = manager.clone();
        manager
            .run_in_transaction(&ctx, move |ctx| async move {
                assert!(inner.in_transaction(&ctx));
                Ok::<_, AppError>(())
            })
            .await
            .unwrap();

        assert_eq!(resource.begins(), 1);
        assert_eq!(resource.commits(), 1);
    }

    #[tokio::test]
    async fn separate_managers_share_one_transaction() {
        let resource = RecordingResource::default();
        let outer = Manager::new(resource.clone());
        let other = Manager::new(resource.clone());

        outer
            .run_in_transaction(&Context::new(), move |ctx| async move {
                let owner = other.current_transaction(&ctx).expect("handle visible");
                let joiner = other.clone();
                other
                    .run_in_transaction(&ctx, move |inner_ctx| async move {
                        let seen = joiner.current_transaction(&inner_ctx).expect("handle reused");
                        assert!(Arc::ptr_eq(&owner, &seen));
                        Ok::<_, AppError>(())
                    })
                    .await
            })
            .await
            .unwrap();

        assert_eq!(resource.begins(), 1);
        assert_eq!(resource.commits(), 1);
        assert_eq!(resource.rollbacks(), 0);
    }

    #[tokio::test]
    async fn commit_failure_is_reported_as_commit_error() {
        let resource = RecordingResource::default();
        resource.fail_commit();
        let manager = Manager::new(resource.clone());

        let err = manager
            .run_in_transaction(&Context::new(), |_| async { Ok::<_, AppError>(()) })
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Transaction(ref e) if e.is_commit()));
        assert_eq!(resource.rollbacks(), 0);
    }

    #[tokio::test]
    async fn rollback_failure_keeps_the_work_error() {
        let resource = RecordingResource::default();
        resource.fail_rollback();
        let manager = Manager::new(resource.clone());

        let err = manager
            .run_in_transaction(&Context::new(), |_| async {
                Err::<(), _>(AppError::NotFound("user"))
            })
            .await
            .unwrap_err();

        let tx_err = match err {
            AppError::Transaction(e) => e,
            other => panic!("expected a transaction error, got {other:?}"),
        };
        assert!(tx_err.is_rollback());
        let work = tx_err.work_error().expect("work error kept");
        assert!(matches!(
            work.downcast_ref::<AppError>(),
            Some(AppError::NotFound("user"))
        ));
        assert_eq!(resource.commits(), 0);
        assert_eq!(resource.rollbacks(), 1);
    }

    #[tokio::test]
    async fn begin_failure_skips_the_work() {
        let resource = RecordingResource::default();
        resource.fail_begin();
        let manager = Manager::new(resource.clone());
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);

        let err = manager
            .run_in_transaction(&Context::new(), move |_| async move {
                flag.store(true, Ordering::SeqCst);
                Ok::<_, AppError>(())
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Transaction(ref e) if e.is_begin()));
        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(resource.commits() + resource.rollbacks(), 0);
    }
}
