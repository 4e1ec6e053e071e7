//! In-memory resource that records how the coordinator drives it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::resource::{TransactionHandle, TransactionalResource};

#[derive(Debug, thiserror::Error)]
#[error("test database: {0}")]
pub struct TestDbError(pub &'static str);

#[derive(Default)]
struct Recorder {
    begins: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    fail_begin: AtomicBool,
    fail_commit: AtomicBool,
    fail_rollback: AtomicBool,
}

#[derive(Clone, Default)]
pub struct RecordingResource {
    recorder: Arc<Recorder>,
}

impl RecordingResource {
    pub fn begins(&self) -> usize {
        self.recorder.begins.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.recorder.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.recorder.rollbacks.load(Ordering::SeqCst)
    }

    pub fn fail_begin(&self) {
        self.recorder.fail_begin.store(true, Ordering::SeqCst);
    }

    pub fn fail_commit(&self) {
        self.recorder.fail_commit.store(true, Ordering::SeqCst);
    }

    pub fn fail_rollback(&self) {
        self.recorder.fail_rollback.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl TransactionalResource for RecordingResource {
    type Handle = RecordingHandle;
    type Error = TestDbError;

    async fn begin(&self) -> Result<RecordingHandle, TestDbError> {
        if self.recorder.fail_begin.load(Ordering::SeqCst) {
            return Err(TestDbError("begin refused"));
        }
        let id = self.recorder.begins.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(RecordingHandle {
            id,
            recorder: Arc::clone(&self.recorder),
            finished: AtomicBool::new(false),
        })
    }
}

pub struct RecordingHandle {
    id: usize,
    recorder: Arc<Recorder>,
    finished: AtomicBool,
}

impl RecordingHandle {
    /// Sequence number of the `begin` that produced this handle, starting at 1.
    pub fn id(&self) -> usize {
        self.id
    }

    fn finish(&self) -> Result<(), TestDbError> {
        if self.finished.swap(true, Ordering::SeqCst) {
            return Err(TestDbError("transaction already finished"));
        }
        Ok(())
    }
}

#[async_trait]
impl TransactionHandle for RecordingHandle {
    type Error = TestDbError;

    async fn commit(&self) -> Result<(), TestDbError> {
        self.finish()?;
        self.recorder.commits.fetch_add(1, Ordering::SeqCst);
        if self.recorder.fail_commit.load(Ordering::SeqCst) {
            return Err(TestDbError("commit refused"));
        }
        Ok(())
    }

    async fn rollback(&self) -> Result<(), TestDbError> {
        self.finish()?;
        self.recorder.rollbacks.fetch_add(1, Ordering::SeqCst);
        if self.recorder.fail_rollback.load(Ordering::SeqCst) {
            return Err(TestDbError("rollback refused"));
        }
        Ok(())
    }
}
