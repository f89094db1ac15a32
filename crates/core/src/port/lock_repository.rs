// Lock Repository Port (Interface)

use crate::domain::{Lock, SnapshotId};
use crate::error::Result;
use async_trait::async_trait;

/// Outcome of an atomic acquire attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockAcquisition {
    /// The caller now holds this lock
    Acquired(Lock),
    /// Someone else holds an unexpired lock
    Held(Lock),
}

/// Repository interface for snapshot locks
///
/// Implementations must make `try_acquire` a single atomic operation: the
/// existence check and the insert cannot be separated, since concurrent
/// callers may live in different processes.
#[async_trait]
pub trait LockRepository: Send + Sync {
    /// Insert `lock`, or replace an existing row only if it expired before `lock.acquired_at`
    async fn try_acquire(&self, lock: &Lock) -> Result<LockAcquisition>;

    /// Unexpired lock for this snapshot, if any
    async fn find_active(&self, snapshot_id: &SnapshotId, now_millis: i64) -> Result<Option<Lock>>;

    /// Delete the lock unconditionally. Returns `true` if a row was removed
    async fn delete(&self, snapshot_id: &SnapshotId) -> Result<bool>;
}
