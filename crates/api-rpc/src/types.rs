//! RPC Request/Response Types
//!
//! Defines the JSON-RPC method parameters and results.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tunekeeper_core::domain::{FilterSpec, JobStatus, Lock, LockContext, RetryOrigin, Snapshot};

/// snapshot.create.v1 - Export a filter and submit a training job
#[derive(Debug, Deserialize)]
pub struct CreateSnapshotParams {
    #[serde(default)]
    pub filter_spec: FilterSpec,
    pub name: String,
    pub requested_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSnapshotResponse {
    pub success: bool,
    pub snapshot_id: String,
    pub job_id: String,
    pub export_ref: String,
    pub version: String,
    pub example_count: i64,
}

/// job.retry.v1 - Retry a snapshot's training job
#[derive(Debug, Deserialize)]
pub struct RetryParams {
    pub snapshot_id: Option<String>,
    pub job_id: Option<String>,
    pub retry_reason: Option<String>,
    /// Shorthand for `retry_origin = "webhook"`
    #[serde(default)]
    pub auto_retry: bool,
    pub retry_origin: Option<RetryOrigin>,
    pub requested_by: Option<String>,
}

impl RetryParams {
    /// Explicit origin wins, then `auto_retry`, otherwise manual
    pub fn origin(&self) -> RetryOrigin {
        match (self.retry_origin, self.auto_retry) {
            (Some(origin), _) => origin,
            (None, true) => RetryOrigin::Webhook,
            (None, false) => RetryOrigin::Manual,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryResponse {
    pub success: bool,
    pub snapshot_id: String,
    pub job_id: String,
    pub retry_count: i32,
    pub version: String,
}

/// lock.override.v1 / lock.status.v1
#[derive(Debug, Deserialize)]
pub struct SnapshotIdParams {
    pub snapshot_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockOverrideResponse {
    pub snapshot_id: String,
    pub released: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockStatusResponse {
    pub snapshot_id: String,
    pub locked: bool,
    pub holder_id: Option<String>,
    pub context: Option<LockContext>,
    pub expires_at: Option<i64>,
    pub remaining_ms: i64,
}

impl LockStatusResponse {
    pub fn from_lock(snapshot_id: String, lock: Option<Lock>, now_millis: i64) -> Self {
        match lock {
            Some(lock) => Self {
                snapshot_id,
                locked: true,
                remaining_ms: lock.remaining_ms(now_millis),
                holder_id: Some(lock.holder_id),
                context: Some(lock.context),
                expires_at: Some(lock.expires_at),
            },
            None => Self {
                snapshot_id,
                locked: false,
                holder_id: None,
                context: None,
                expires_at: None,
                remaining_ms: 0,
            },
        }
    }
}

/// snapshot.list.v1
#[derive(Debug, Deserialize)]
pub struct ListSnapshotsParams {
    pub status: Option<JobStatus>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

impl Default for ListSnapshotsParams {
    fn default() -> Self {
        Self {
            status: None,
            limit: default_limit(),
            offset: 0,
        }
    }
}

/// Largest page snapshot.list.v1 will return
pub const MAX_LIST_LIMIT: i64 = 500;

/// Snapshot as shown to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotView {
    pub id: String,
    pub name: String,
    pub version: String,
    pub filter_spec: FilterSpec,
    pub filter_hash: String,
    pub created_by: String,
    pub job_id: Option<String>,
    pub file_id: Option<String>,
    pub model_version: Option<String>,
    pub job_status: JobStatus,
    pub retry_count: i32,
    pub max_retries: i32,
    pub permanently_failed: bool,
    pub example_count: Option<i64>,
    pub error_message: Option<String>,
    pub stale: bool,
    pub created_at: i64,
    pub updated_at: i64,
    pub completed_at: Option<i64>,
}

impl From<Snapshot> for SnapshotView {
    fn from(s: Snapshot) -> Self {
        Self {
            permanently_failed: s.is_permanently_failed(),
            id: s.id,
            name: s.name,
            version: s.version,
            filter_spec: s.filter_spec,
            filter_hash: s.filter_hash,
            created_by: s.created_by,
            job_id: s.job_id,
            file_id: s.file_id,
            model_version: s.model_version,
            job_status: s.job_status,
            retry_count: s.retry_count,
            max_retries: s.max_retries,
            example_count: s.example_count,
            error_message: s.error_message,
            stale: s.stale,
            created_at: s.created_at,
            updated_at: s.updated_at,
            completed_at: s.completed_at,
        }
    }
}

/// admin.stats.v1
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub total_snapshots: i64,
    pub by_status: BTreeMap<String, i64>,
    pub uptime_seconds: i64,
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn retry_params(json: &str) -> RetryParams {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_retry_origin_resolution() {
        assert_eq!(retry_params(r#"{"snapshot_id":"s"}"#).origin(), RetryOrigin::Manual);
        assert_eq!(
            retry_params(r#"{"snapshot_id":"s","auto_retry":true}"#).origin(),
            RetryOrigin::Webhook
        );
        assert_eq!(
            retry_params(r#"{"job_id":"j","auto_retry":true,"retry_origin":"scheduled"}"#)
                .origin(),
            RetryOrigin::Scheduled
        );
    }

    #[test]
    fn test_unknown_origin_is_rejected() {
        assert!(serde_json::from_str::<RetryParams>(r#"{"retry_origin":"cron"}"#).is_err());
    }

    #[test]
    fn test_list_defaults() {
        let params: ListSnapshotsParams = serde_json::from_str("{}").unwrap();
        assert_eq!(params.limit, 50);
        assert_eq!(params.offset, 0);
        assert!(params.status.is_none());
    }

    #[test]
    fn test_lock_status_without_lock() {
        let status = LockStatusResponse::from_lock("snap-1".to_string(), None, 1_000);
        assert!(!status.locked);
        assert_eq!(status.remaining_ms, 0);
    }
}
