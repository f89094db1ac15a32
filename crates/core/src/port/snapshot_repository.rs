// Snapshot Repository Port (Interface)

use crate::domain::{JobId, JobStatus, Snapshot, SnapshotId};
use crate::error::Result;
use async_trait::async_trait;

/// Conditional status write applied by the poller
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub status: JobStatus,
    pub model_version: Option<String>,
    pub error_message: Option<String>,
    pub completed_at: Option<i64>,
    pub updated_at: i64,
}

/// Repository interface for Snapshot persistence
#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    /// Insert a new snapshot
    async fn insert(&self, snapshot: &Snapshot) -> Result<()>;

    /// Find snapshot by ID
    async fn find_by_id(&self, id: &SnapshotId) -> Result<Option<Snapshot>>;

    /// Find the snapshot currently tracking a provider job
    async fn find_by_job_id(&self, job_id: &JobId) -> Result<Option<Snapshot>>;

    /// Overwrite the mutable fields of a snapshot
    async fn update(&self, snapshot: &Snapshot) -> Result<()>;

    /// Overwrite the mutable fields only if the stored row still has
    /// `expected_status` and `expected_job_id`.
    ///
    /// Returns `false` when another writer changed the row first.
    async fn update_if_unchanged(
        &self,
        snapshot: &Snapshot,
        expected_status: JobStatus,
        expected_job_id: Option<&JobId>,
    ) -> Result<bool>;

    /// Write an observed status, but only if the snapshot still tracks `job_id`
    /// in `expected_status`.
    ///
    /// Returns `false` when the snapshot moved on (a retry or a concurrent
    /// poll got there first).
    async fn update_job_status(
        &self,
        id: &SnapshotId,
        job_id: &JobId,
        expected_status: JobStatus,
        update: &StatusUpdate,
    ) -> Result<bool>;

    /// Snapshots the poller still has to reconcile: non-terminal, with a job,
    /// and not `retrying` (a retry in progress owns the row until it submits)
    async fn find_in_flight(&self) -> Result<Vec<Snapshot>>;

    /// Failed, fresh snapshots with a provider job and budget left: failures
    /// whose automatic retry has not gone through yet
    async fn find_retry_candidates(&self) -> Result<Vec<Snapshot>>;

    /// Page through snapshots, newest first
    async fn list(&self, status: Option<JobStatus>, limit: i64, offset: i64)
        -> Result<Vec<Snapshot>>;

    /// Count snapshots by status
    async fn count_by_status(&self, status: JobStatus) -> Result<i64>;
}
