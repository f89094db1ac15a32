// Snapshot Domain Model

use crate::domain::error::{DomainError, Result};
use crate::domain::filter::{FilterHash, FilterSpec};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Snapshot ID (UUID v4)
pub type SnapshotId = String;

/// External provider job handle
pub type JobId = String;

/// Job status, normalized from the training provider's vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Uploading,
    ValidatingFiles,
    Queued,
    Running,
    Succeeded,
    Failed,
    Retrying,
}

impl JobStatus {
    pub const ALL: [JobStatus; 8] = [
        JobStatus::Pending,
        JobStatus::Uploading,
        JobStatus::ValidatingFiles,
        JobStatus::Queued,
        JobStatus::Running,
        JobStatus::Succeeded,
        JobStatus::Failed,
        JobStatus::Retrying,
    ];

    /// Statuses the poller still has to reconcile
    pub const NON_TERMINAL: [JobStatus; 6] = [
        JobStatus::Pending,
        JobStatus::Uploading,
        JobStatus::ValidatingFiles,
        JobStatus::Queued,
        JobStatus::Running,
        JobStatus::Retrying,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Uploading => "uploading",
            JobStatus::ValidatingFiles => "validating_files",
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Retrying => "retrying",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }

    /// Statuses a provider may report for a job it has not started training
    pub fn is_pre_running(&self) -> bool {
        matches!(
            self,
            JobStatus::Pending | JobStatus::Uploading | JobStatus::ValidatingFiles
        )
    }

    /// Progress rank of the forward-only pre-terminal statuses
    fn rank(&self) -> Option<u8> {
        match self {
            JobStatus::Pending => Some(0),
            JobStatus::Uploading => Some(1),
            JobStatus::ValidatingFiles => Some(2),
            JobStatus::Queued => Some(3),
            JobStatus::Running => Some(4),
            _ => None,
        }
    }

    /// Whether `self -> next` is a legal move. Re-entering the same status is
    /// always legal (and a no-op for callers).
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        if *self == next {
            return true;
        }

        match (self, next) {
            (JobStatus::Succeeded, _) => false,
            (JobStatus::Failed, JobStatus::Retrying) => true,
            (JobStatus::Failed, _) => false,
            (JobStatus::Retrying, _) => true,
            // An operator may retry an in-flight job once its lock has lapsed
            (_, JobStatus::Retrying) => true,
            (_, to) if to.is_terminal() => true,
            (from, to) => match (from.rank(), to.rank()) {
                (Some(a), Some(b)) => b > a,
                _ => false,
            },
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "uploading" => Ok(JobStatus::Uploading),
            "validating_files" => Ok(JobStatus::ValidatingFiles),
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "succeeded" => Ok(JobStatus::Succeeded),
            "failed" => Ok(JobStatus::Failed),
            "retrying" => Ok(JobStatus::Retrying),
            other => Err(DomainError::UnknownStatus(other.to_string())),
        }
    }
}

/// Timestamp-derived version label, e.g. `v20261018-142501` or
/// `v20261018-142501-r2` for the second retry
pub fn version_label(now_millis: i64, retry_count: i32) -> String {
    let stamp = chrono::DateTime::from_timestamp_millis(now_millis)
        .unwrap_or_default()
        .format("%Y%m%d-%H%M%S");

    if retry_count > 0 {
        format!("v{}-r{}", stamp, retry_count)
    } else {
        format!("v{}", stamp)
    }
}

/// Snapshot Entity: one versioned export and its training job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: SnapshotId,
    pub name: String,
    pub filter_spec: FilterSpec,
    pub filter_hash: FilterHash,
    pub version: String,
    pub created_by: String,

    // Provider identity (None until submitted)
    pub job_id: Option<JobId>,
    pub file_id: Option<String>,
    pub model_version: Option<String>,

    pub job_status: JobStatus,
    pub retry_count: i32,
    pub max_retries: i32,
    pub example_count: Option<i64>,
    pub error_message: Option<String>,

    /// Superseded by a newer snapshot with the same filter after data changed
    pub stale: bool,

    pub created_at: i64, // epoch ms
    pub updated_at: i64,
    pub completed_at: Option<i64>,
}

impl Snapshot {
    /// Create a new snapshot in `uploading`
    ///
    /// # Arguments
    ///
    /// * `id` - Unique snapshot ID (injected, not generated)
    /// * `created_at` - Creation timestamp in epoch ms (injected, not system time)
    /// * `name` - Display name
    /// * `filter_spec` - Predicates selecting the exported data
    /// * `filter_hash` - Fingerprint of `filter_spec`
    /// * `created_by` - Requester identity
    /// * `max_retries` - Retry budget
    pub fn new(
        id: impl Into<String>,
        created_at: i64,
        name: impl Into<String>,
        filter_spec: FilterSpec,
        filter_hash: impl Into<String>,
        created_by: impl Into<String>,
        max_retries: i32,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            filter_spec,
            filter_hash: filter_hash.into(),
            version: version_label(created_at, 0),
            created_by: created_by.into(),
            job_id: None,
            file_id: None,
            model_version: None,
            job_status: JobStatus::Uploading,
            retry_count: 0,
            max_retries,
            example_count: None,
            error_message: None,
            stale: false,
            created_at,
            updated_at: created_at,
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.job_status.is_terminal()
    }

    /// No retry attempts left
    pub fn budget_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }

    /// Failed with no budget left: nothing will move this snapshot again
    pub fn is_permanently_failed(&self) -> bool {
        self.job_status == JobStatus::Failed && self.budget_exhausted()
    }

    /// Move to `next`, enforcing the status state machine.
    ///
    /// Returns `true` if the status actually changed.
    pub fn transition_to(&mut self, next: JobStatus, now_millis: i64) -> Result<bool> {
        if !self.job_status.can_transition_to(next) {
            return Err(DomainError::InvalidStateTransition {
                from: self.job_status.to_string(),
                to: next.to_string(),
            });
        }
        if self.job_status == next {
            return Ok(false);
        }

        self.job_status = next;
        self.updated_at = now_millis;
        self.completed_at = if next.is_terminal() {
            Some(now_millis)
        } else {
            None
        };
        Ok(true)
    }

    /// Attach a freshly created provider job.
    ///
    /// The job identity is always recorded. A new job may report any
    /// pre-running status, `pending` included, regardless of rank. Returns
    /// `false` if the reported status could not be applied; the status is then
    /// left for the poller to reconcile.
    pub fn record_submission(
        &mut self,
        job_id: impl Into<String>,
        file_id: impl Into<String>,
        status: JobStatus,
        model: Option<String>,
        now_millis: i64,
    ) -> bool {
        self.job_id = Some(job_id.into());
        self.file_id = Some(file_id.into());
        if model.is_some() {
            self.model_version = model;
        }
        self.error_message = None;
        self.updated_at = now_millis;

        let submitting = matches!(self.job_status, JobStatus::Uploading | JobStatus::Retrying);
        if submitting && status.is_pre_running() {
            self.job_status = status;
            self.completed_at = None;
            return true;
        }
        self.transition_to(status, now_millis).is_ok()
    }

    /// Mark the snapshot failed (pre-submission failure or exhausted budget)
    pub fn mark_failed(&mut self, reason: impl Into<String>, now_millis: i64) -> Result<()> {
        self.transition_to(JobStatus::Failed, now_millis)?;
        self.error_message = Some(reason.into());
        Ok(())
    }

    /// Consume one unit of retry budget after a retry job was created
    pub fn complete_retry(&mut self, now_millis: i64) {
        self.retry_count = (self.retry_count + 1).min(self.max_retries);
        self.version = version_label(now_millis, self.retry_count);
        self.updated_at = now_millis;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> Snapshot {
        Snapshot::new(
            "snap-1",
            1_000,
            "weekly export",
            FilterSpec::default(),
            "hash",
            "user-1",
            3,
        )
    }

    #[test]
    fn test_new_snapshot_defaults() {
        let s = snapshot();
        assert_eq!(s.job_status, JobStatus::Uploading);
        assert_eq!(s.retry_count, 0);
        assert!(s.job_id.is_none());
        assert!(s.version.starts_with("v1970"));
    }

    #[test]
    fn test_forward_progress_allowed() {
        let mut s = snapshot();
        assert!(s.transition_to(JobStatus::ValidatingFiles, 2_000).unwrap());
        assert!(s.transition_to(JobStatus::Running, 3_000).unwrap());
        assert!(s.transition_to(JobStatus::Succeeded, 4_000).unwrap());
        assert_eq!(s.completed_at, Some(4_000));
    }

    #[test]
    fn test_same_status_is_noop() {
        let mut s = snapshot();
        s.transition_to(JobStatus::Running, 2_000).unwrap();
        assert!(!s.transition_to(JobStatus::Running, 3_000).unwrap());
        assert_eq!(s.updated_at, 2_000);
    }

    #[test]
    fn test_backwards_move_rejected() {
        let mut s = snapshot();
        s.transition_to(JobStatus::Running, 2_000).unwrap();
        let err = s.transition_to(JobStatus::Queued, 3_000).unwrap_err();
        assert!(err.to_string().contains("running -> queued"));
    }

    #[test]
    fn test_succeeded_is_final() {
        let mut s = snapshot();
        s.transition_to(JobStatus::Succeeded, 2_000).unwrap();
        assert!(s.transition_to(JobStatus::Retrying, 3_000).is_err());
        assert!(s.transition_to(JobStatus::Failed, 3_000).is_err());
    }

    #[test]
    fn test_failed_only_moves_to_retrying() {
        let mut s = snapshot();
        s.transition_to(JobStatus::Failed, 2_000).unwrap();
        assert!(s.transition_to(JobStatus::Running, 3_000).is_err());
        assert!(s.transition_to(JobStatus::Retrying, 3_000).unwrap());
        assert!(s.completed_at.is_none());
        assert!(s.transition_to(JobStatus::ValidatingFiles, 4_000).unwrap());
    }

    #[test]
    fn test_new_job_may_report_pending() {
        let mut s = snapshot();
        assert!(s.record_submission("ftjob-1", "file-1", JobStatus::Pending, None, 2_000));
        assert_eq!(s.job_status, JobStatus::Pending);
        assert_eq!(s.job_id.as_deref(), Some("ftjob-1"));

        let mut retried = snapshot();
        retried.transition_to(JobStatus::Failed, 2_000).unwrap();
        retried.transition_to(JobStatus::Retrying, 3_000).unwrap();
        assert!(retried.record_submission("ftjob-2", "file-2", JobStatus::Pending, None, 4_000));
        assert_eq!(retried.job_status, JobStatus::Pending);
    }

    #[test]
    fn test_submission_keeps_job_when_status_rejected() {
        let mut s = snapshot();
        s.transition_to(JobStatus::Running, 2_000).unwrap();
        assert!(!s.record_submission("ftjob-1", "file-1", JobStatus::Pending, None, 3_000));
        assert_eq!(s.job_status, JobStatus::Running);
        assert_eq!(s.job_id.as_deref(), Some("ftjob-1"));
        assert_eq!(s.file_id.as_deref(), Some("file-1"));
    }

    #[test]
    fn test_complete_retry_caps_at_budget() {
        let mut s = snapshot();
        for i in 0..5 {
            s.complete_retry(10_000 + i);
        }
        assert_eq!(s.retry_count, 3);
        assert!(s.budget_exhausted());
        assert!(s.version.ends_with("-r3"));
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in JobStatus::ALL {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("cancelled".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_version_label_format() {
        // 2024-01-02T03:04:05Z
        let ms = 1_704_164_645_000;
        assert_eq!(version_label(ms, 0), "v20240102-030405");
        assert_eq!(version_label(ms, 2), "v20240102-030405-r2");
    }
}
