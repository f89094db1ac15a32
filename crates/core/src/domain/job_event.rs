// JobEvent Domain Model

use crate::domain::error::{DomainError, Result};
use crate::domain::snapshot::{JobId, JobStatus, SnapshotId};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// What initiated a retry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryOrigin {
    Manual,
    Scheduled,
    /// Automatic retry (poller hand-off or provider callback)
    Webhook,
}

impl RetryOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetryOrigin::Manual => "manual",
            RetryOrigin::Scheduled => "scheduled",
            RetryOrigin::Webhook => "webhook",
        }
    }

    /// Only automatic retries are subject to the cooldown window
    pub fn is_automatic(&self) -> bool {
        matches!(self, RetryOrigin::Webhook)
    }
}

impl std::fmt::Display for RetryOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RetryOrigin {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "manual" => Ok(RetryOrigin::Manual),
            "scheduled" => Ok(RetryOrigin::Scheduled),
            "webhook" => Ok(RetryOrigin::Webhook),
            other => Err(DomainError::UnknownRetryOrigin(other.to_string())),
        }
    }
}

/// Audit record of one observed job status; unique per (job_id, status)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEvent {
    pub job_id: JobId,
    pub snapshot_id: SnapshotId,
    pub user_id: String,
    pub status: JobStatus,
    pub message: Option<String>,
    pub retry_origin: Option<RetryOrigin>,
    pub retry_reason: Option<String>,
    pub created_at: i64, // epoch ms
}

impl JobEvent {
    pub fn new(
        job_id: impl Into<String>,
        snapshot_id: impl Into<String>,
        user_id: impl Into<String>,
        status: JobStatus,
        created_at: i64,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            snapshot_id: snapshot_id.into(),
            user_id: user_id.into(),
            status,
            message: None,
            retry_origin: None,
            retry_reason: None,
            created_at,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_retry(mut self, origin: RetryOrigin, reason: Option<String>) -> Self {
        self.retry_origin = Some(origin);
        self.retry_reason = reason;
        self
    }
}
