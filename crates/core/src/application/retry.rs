// Retry Orchestrator - budget, cooldown and lock gated resubmission
use crate::application::job_submitter::{JobSubmitter, SubmissionContext};
use crate::application::lock_manager::LockManager;
use crate::application::settings::LifecycleSettings;
use crate::domain::{JobStatus, LockContext, RetryOrigin, Snapshot};
use crate::error::{AppError, Result};
use crate::port::{JobEventRepository, SnapshotRepository, TimeProvider, TrainingDataSource};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Retry request; `snapshot_id` wins when both identifiers are given
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryRequest {
    pub snapshot_id: Option<String>,
    pub job_id: Option<String>,
    pub retry_reason: Option<String>,
    pub retry_origin: RetryOrigin,
    pub requested_by: Option<String>,
}

impl RetryRequest {
    pub fn for_snapshot(snapshot_id: impl Into<String>, origin: RetryOrigin) -> Self {
        Self {
            snapshot_id: Some(snapshot_id.into()),
            job_id: None,
            retry_reason: None,
            retry_origin: origin,
            requested_by: None,
        }
    }

    pub fn for_job(job_id: impl Into<String>, origin: RetryOrigin) -> Self {
        Self {
            snapshot_id: None,
            job_id: Some(job_id.into()),
            retry_reason: None,
            retry_origin: origin,
            requested_by: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.retry_reason = Some(reason.into());
        self
    }

    pub fn requested_by(mut self, user_id: impl Into<String>) -> Self {
        self.requested_by = Some(user_id.into());
        self
    }
}

/// Result of an accepted retry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryOutcome {
    pub snapshot_id: String,
    pub job_id: String,
    pub retry_count: i32,
    pub version: String,
}

pub struct RetryOrchestrator {
    snapshot_repo: Arc<dyn SnapshotRepository>,
    event_repo: Arc<dyn JobEventRepository>,
    lock_manager: Arc<LockManager>,
    data_source: Arc<dyn TrainingDataSource>,
    submitter: Arc<JobSubmitter>,
    time_provider: Arc<dyn TimeProvider>,
    settings: LifecycleSettings,
}

impl RetryOrchestrator {
    pub fn new(
        snapshot_repo: Arc<dyn SnapshotRepository>,
        event_repo: Arc<dyn JobEventRepository>,
        lock_manager: Arc<LockManager>,
        data_source: Arc<dyn TrainingDataSource>,
        submitter: Arc<JobSubmitter>,
        time_provider: Arc<dyn TimeProvider>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            snapshot_repo,
            event_repo,
            lock_manager,
            data_source,
            submitter,
            time_provider,
            settings,
        }
    }

    /// Retry a snapshot's training job
    ///
    /// Preconditions, in order:
    /// 1. Snapshot exists (`NotFound`)
    /// 2. Budget left (`RetryBudgetExceeded`; the snapshot is forced to
    ///    terminal `failed`)
    /// 3. Not already succeeded (`Conflict`)
    /// 4. Automatic origin only: cooldown elapsed since the last retry
    ///    (`CooldownActive`)
    /// 5. No unexpired lock (`LockHeld`)
    ///
    /// The lock taken here is never released explicitly; it lapses after its TTL.
    pub async fn retry(&self, req: RetryRequest) -> Result<RetryOutcome> {
        let mut snapshot = self.resolve_snapshot(&req).await?;
        self.check_preconditions(&mut snapshot, req.retry_origin)
            .await?;

        self.lock_manager
            .acquire(&snapshot.id, LockContext::from(req.retry_origin))
            .await?;

        let now = self.time_provider.now_millis();
        let abandoned_job = snapshot.job_id.clone();
        let observed_status = snapshot.job_status;
        snapshot.transition_to(JobStatus::Retrying, now)?;
        let claimed = self
            .snapshot_repo
            .update_if_unchanged(&snapshot, observed_status, abandoned_job.as_ref())
            .await?;
        if !claimed {
            // A poll (or another writer) moved the snapshot after it was read
            warn!(
                snapshot_id = %snapshot.id,
                observed_status = %observed_status,
                "Snapshot changed before the retry could claim it"
            );
            return Err(AppError::Conflict(format!(
                "Snapshot {} changed while the retry was starting",
                snapshot.id
            )));
        }

        info!(
            snapshot_id = %snapshot.id,
            abandoned_job = ?abandoned_job,
            retry_origin = %req.retry_origin,
            retry_count = snapshot.retry_count,
            reason = ?req.retry_reason,
            "Retrying training job"
        );

        // Explicit retry of existing data: no staleness gate
        let payload = match self.data_source.export(&snapshot.filter_spec).await {
            Ok(p) if p.example_count >= self.settings.min_examples => p,
            Ok(p) => {
                let err = AppError::Validation(format!(
                    "Not enough training examples: {} (minimum {})",
                    p.example_count, self.settings.min_examples
                ));
                return Err(self.abort_retry(&mut snapshot, err).await);
            }
            Err(e) => return Err(self.abort_retry(&mut snapshot, e).await),
        };

        let user_id = req
            .requested_by
            .clone()
            .unwrap_or_else(|| snapshot.created_by.clone());
        let ctx = SubmissionContext::retry(req.retry_origin, req.retry_reason.clone(), user_id);
        let job = self.submitter.submit(&mut snapshot, payload, ctx).await?;

        Ok(RetryOutcome {
            snapshot_id: snapshot.id,
            job_id: job.id,
            retry_count: snapshot.retry_count,
            version: snapshot.version,
        })
    }

    async fn resolve_snapshot(&self, req: &RetryRequest) -> Result<Snapshot> {
        if let Some(snapshot_id) = &req.snapshot_id {
            return self
                .snapshot_repo
                .find_by_id(snapshot_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Snapshot {} not found", snapshot_id)));
        }

        let Some(job_id) = &req.job_id else {
            return Err(AppError::Validation(
                "Either snapshot_id or job_id is required".to_string(),
            ));
        };

        let snapshot_id = match self.event_repo.latest_for_job(job_id).await? {
            Some(event) => Some(event.snapshot_id),
            None => self
                .snapshot_repo
                .find_by_job_id(job_id)
                .await?
                .map(|s| s.id),
        };

        match snapshot_id {
            Some(id) => self
                .snapshot_repo
                .find_by_id(&id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Snapshot {} not found", id))),
            None => Err(AppError::NotFound(format!("Job {} not found", job_id))),
        }
    }

    async fn check_preconditions(&self, snapshot: &mut Snapshot, origin: RetryOrigin) -> Result<()> {
        let now = self.time_provider.now_millis();

        if snapshot.budget_exhausted() {
            if !snapshot.is_terminal() {
                let observed_status = snapshot.job_status;
                let job_id = snapshot.job_id.clone();
                snapshot.mark_failed("retry budget exhausted", now)?;
                let forced = self
                    .snapshot_repo
                    .update_if_unchanged(snapshot, observed_status, job_id.as_ref())
                    .await?;
                if !forced {
                    warn!(snapshot_id = %snapshot.id, "Snapshot changed before it could be failed");
                }
            }
            warn!(
                snapshot_id = %snapshot.id,
                retry_count = snapshot.retry_count,
                max_retries = snapshot.max_retries,
                "Retry budget exhausted"
            );
            return Err(AppError::RetryBudgetExceeded {
                snapshot_id: snapshot.id.clone(),
                retry_count: snapshot.retry_count,
                max_retries: snapshot.max_retries,
            });
        }

        if snapshot.job_status == JobStatus::Succeeded {
            return Err(AppError::Conflict(format!(
                "Snapshot {} already completed",
                snapshot.id
            )));
        }

        // Humans are not throttled; only automatic retries honour the cooldown
        if origin.is_automatic() {
            if let Some(last) = self.event_repo.latest_retry_for_snapshot(&snapshot.id).await? {
                let elapsed = now - last.created_at;
                if elapsed < self.settings.retry_cooldown_ms {
                    return Err(AppError::CooldownActive {
                        snapshot_id: snapshot.id.clone(),
                        retry_after_ms: self.settings.retry_cooldown_ms - elapsed,
                    });
                }
            }
        }

        if let Some(lock) = self.lock_manager.active(&snapshot.id).await? {
            return Err(AppError::LockHeld {
                snapshot_id: snapshot.id.clone(),
                expires_at: lock.expires_at,
            });
        }

        Ok(())
    }

    /// Export failed before any job existed: back to `failed`, budget untouched
    async fn abort_retry(&self, snapshot: &mut Snapshot, err: AppError) -> AppError {
        let now = self.time_provider.now_millis();
        error!(snapshot_id = %snapshot.id, error = %err, "Retry aborted before submission");

        if let Err(e) = snapshot.mark_failed(format!("retry export failed: {}", err), now) {
            return AppError::from(e);
        }
        if let Err(e) = self.snapshot_repo.update(snapshot).await {
            error!(snapshot_id = %snapshot.id, error = %e, "Failed to persist retry abort");
        }
        err
    }
}
