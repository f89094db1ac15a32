// Lock Domain Model

use crate::domain::error::{DomainError, Result};
use crate::domain::job_event::RetryOrigin;
use crate::domain::snapshot::SnapshotId;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// What the lock holder is doing with the snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockContext {
    Export,
    Manual,
    Scheduled,
    Webhook,
}

impl LockContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockContext::Export => "export",
            LockContext::Manual => "manual",
            LockContext::Scheduled => "scheduled",
            LockContext::Webhook => "webhook",
        }
    }
}

impl From<RetryOrigin> for LockContext {
    fn from(origin: RetryOrigin) -> Self {
        match origin {
            RetryOrigin::Manual => LockContext::Manual,
            RetryOrigin::Scheduled => LockContext::Scheduled,
            RetryOrigin::Webhook => LockContext::Webhook,
        }
    }
}

impl std::fmt::Display for LockContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LockContext {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "export" => Ok(LockContext::Export),
            "manual" => Ok(LockContext::Manual),
            "scheduled" => Ok(LockContext::Scheduled),
            "webhook" => Ok(LockContext::Webhook),
            other => Err(DomainError::UnknownLockContext(other.to_string())),
        }
    }
}

/// Time-boxed exclusive claim on a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
    pub snapshot_id: SnapshotId,
    pub holder_id: String,
    pub context: LockContext,
    pub acquired_at: i64, // epoch ms
    pub expires_at: i64,
}

impl Lock {
    pub fn new(
        snapshot_id: impl Into<String>,
        holder_id: impl Into<String>,
        context: LockContext,
        acquired_at: i64,
        ttl_ms: i64,
    ) -> Self {
        Self {
            snapshot_id: snapshot_id.into(),
            holder_id: holder_id.into(),
            context,
            acquired_at,
            expires_at: acquired_at + ttl_ms,
        }
    }

    /// A lock whose `expires_at` has passed is treated as absent
    pub fn is_expired(&self, now_millis: i64) -> bool {
        self.expires_at <= now_millis
    }

    pub fn remaining_ms(&self, now_millis: i64) -> i64 {
        (self.expires_at - now_millis).max(0)
    }
}
