// JobEvent Repository Port (Interface)

use crate::domain::{JobEvent, JobId, SnapshotId};
use crate::error::Result;
use async_trait::async_trait;

/// Repository interface for the job event audit trail
#[async_trait]
pub trait JobEventRepository: Send + Sync {
    /// Insert-or-ignore keyed by (job_id, status).
    ///
    /// Returns `true` if the event is new, `false` if that status was already
    /// recorded for the job.
    async fn record(&self, event: &JobEvent) -> Result<bool>;

    /// Most recent retry-originated event for a snapshot (cooldown anchor)
    async fn latest_retry_for_snapshot(&self, snapshot_id: &SnapshotId)
        -> Result<Option<JobEvent>>;

    /// Most recent event for a provider job
    async fn latest_for_job(&self, job_id: &JobId) -> Result<Option<JobEvent>>;

    /// Full history of a snapshot, oldest first
    async fn list_for_snapshot(&self, snapshot_id: &SnapshotId) -> Result<Vec<JobEvent>>;
}
