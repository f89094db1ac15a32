// Status Poller - reconcile in-flight jobs with the training provider
use crate::application::backoff::retry_with_backoff;
use crate::application::retry::{RetryOrchestrator, RetryRequest};
use crate::application::settings::LifecycleSettings;
use crate::domain::{JobEvent, JobStatus, RetryOrigin, Snapshot};
use crate::error::{AppError, Result};
use crate::port::{
    JobEventRepository, Notification, Notifier, Outcome, ProviderJob, SnapshotRepository,
    StatusUpdate, TimeProvider, TrainingProvider,
};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Summary of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollReport {
    /// In-flight snapshots looked at
    pub checked: usize,
    /// Snapshots whose stored status changed
    pub updated: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Automatic retries accepted, deferred ones resumed this pass included
    pub retried: usize,
    /// Snapshots skipped after provider or storage errors
    pub errors: usize,
}

#[derive(Debug, PartialEq, Eq)]
enum AutoRetry {
    Accepted,
    /// Blocked by a lock or the cooldown; tried again next pass
    Deferred,
    Rejected,
}

/// What happened to one snapshot during a pass
#[derive(Debug, Default)]
struct JobCheck {
    updated: bool,
    /// Terminal status written by this pass
    first_terminal: Option<JobStatus>,
    retried: bool,
}

pub struct StatusPoller {
    snapshot_repo: Arc<dyn SnapshotRepository>,
    event_repo: Arc<dyn JobEventRepository>,
    provider: Arc<dyn TrainingProvider>,
    notifier: Arc<dyn Notifier>,
    retry: Arc<RetryOrchestrator>,
    time_provider: Arc<dyn TimeProvider>,
    settings: LifecycleSettings,
}

impl StatusPoller {
    pub fn new(
        snapshot_repo: Arc<dyn SnapshotRepository>,
        event_repo: Arc<dyn JobEventRepository>,
        provider: Arc<dyn TrainingProvider>,
        notifier: Arc<dyn Notifier>,
        retry: Arc<RetryOrchestrator>,
        time_provider: Arc<dyn TimeProvider>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            snapshot_repo,
            event_repo,
            provider,
            notifier,
            retry,
            time_provider,
            settings,
        }
    }

    /// One reconciliation pass
    ///
    /// First, failed snapshots whose automatic retry was turned away earlier
    /// (lock or cooldown) get another attempt. Then every in-flight job is
    /// checked concurrently. A failure on one snapshot is logged and counted in
    /// `errors`; it never aborts the pass. Running the pass twice without new
    /// provider state changes nothing, since status writes are conditional on
    /// the status and job read and events are unique per (job, status).
    pub async fn run_once(&self) -> Result<PollReport> {
        let mut report = PollReport::default();

        if self.settings.auto_retry {
            self.resume_deferred_retries(&mut report).await?;
        }

        let in_flight = self.snapshot_repo.find_in_flight().await?;
        report.checked = in_flight.len();

        if in_flight.is_empty() && report.retried == 0 && report.errors == 0 {
            debug!("No in-flight jobs to poll");
            return Ok(report);
        }

        let checks = join_all(in_flight.into_iter().map(|s| self.reconcile(s))).await;

        for check in checks {
            match check {
                Ok(check) => {
                    report.updated += check.updated as usize;
                    report.retried += check.retried as usize;
                    match check.first_terminal {
                        Some(JobStatus::Succeeded) => report.succeeded += 1,
                        Some(JobStatus::Failed) => report.failed += 1,
                        _ => {}
                    }
                }
                Err(_) => report.errors += 1,
            }
        }

        info!(
            checked = report.checked,
            updated = report.updated,
            succeeded = report.succeeded,
            failed = report.failed,
            retried = report.retried,
            errors = report.errors,
            "Poll pass completed"
        );
        Ok(report)
    }

    /// Hand failed snapshots with budget left back to the orchestrator.
    ///
    /// A failure is only notified once, when first observed; this path just
    /// retries. Snapshots still blocked by a lock or the cooldown stay
    /// candidates for the next pass.
    async fn resume_deferred_retries(&self, report: &mut PollReport) -> Result<()> {
        let candidates = self.snapshot_repo.find_retry_candidates().await?;

        for snapshot in candidates {
            let reason = snapshot
                .error_message
                .clone()
                .unwrap_or_else(|| "deferred automatic retry".to_string());
            match self.auto_retry(&snapshot, reason).await {
                AutoRetry::Accepted => report.retried += 1,
                AutoRetry::Deferred => {}
                AutoRetry::Rejected => report.errors += 1,
            }
        }
        Ok(())
    }

    async fn reconcile(&self, snapshot: Snapshot) -> Result<JobCheck> {
        let Some(job_id) = snapshot.job_id.clone() else {
            return Ok(JobCheck::default());
        };

        let job = retry_with_backoff(
            "get_job",
            self.settings.provider_max_attempts,
            self.settings.provider_base_delay(),
            || self.provider.get_job(&job_id),
        )
        .await
        .map_err(|e| {
            error!(
                snapshot_id = %snapshot.id,
                job_id = %job_id,
                error = %e,
                "Provider status check failed, skipping until next pass"
            );
            e
        })?;

        let now = self.time_provider.now_millis();
        let mut observed = snapshot.clone();
        let changed = match observed.transition_to(job.status, now) {
            Ok(changed) => changed,
            Err(e) => {
                warn!(
                    snapshot_id = %snapshot.id,
                    job_id = %job_id,
                    error = %e,
                    "Ignoring out-of-order provider status"
                );
                return Ok(JobCheck::default());
            }
        };

        // Event before status: if the status write fails, the snapshot stays
        // in flight and the next pass repeats the whole observation
        let mut event =
            JobEvent::new(&job_id, &snapshot.id, &snapshot.created_by, job.status, now);
        if let Some(message) = &job.error {
            event = event.with_message(message);
        }
        self.event_repo.record(&event).await.map_err(|e| {
            error!(snapshot_id = %snapshot.id, error = %e, "Event write failed");
            e
        })?;

        let mut check = JobCheck::default();
        if !changed {
            return Ok(check);
        }

        let won = self
            .persist_status(&observed, &job_id, snapshot.job_status, &job, now)
            .await
            .map_err(|e| {
                error!(snapshot_id = %snapshot.id, error = %e, "Status write failed");
                e
            })?;
        if !won {
            debug!(
                snapshot_id = %snapshot.id,
                job_id = %job_id,
                "Snapshot moved on before the status write, dropping observation"
            );
            return Ok(check);
        }
        check.updated = true;
        info!(
            snapshot_id = %snapshot.id,
            job_id = %job_id,
            from = %snapshot.job_status,
            to = %job.status,
            "Job status changed"
        );

        // Only the pass that wrote the terminal status handles it
        if job.status.is_terminal() {
            check.first_terminal = Some(job.status);
            if let Some(model) = &job.model {
                observed.model_version = Some(model.clone());
            }
            check.retried = self.on_terminal(&observed, &job).await;
        }

        Ok(check)
    }

    async fn persist_status(
        &self,
        observed: &Snapshot,
        job_id: &str,
        expected_status: JobStatus,
        job: &ProviderJob,
        now: i64,
    ) -> Result<bool> {
        let update = StatusUpdate {
            status: job.status,
            model_version: job.model.clone(),
            error_message: job.error.clone(),
            completed_at: observed.completed_at,
            updated_at: now,
        };
        self.snapshot_repo
            .update_job_status(&observed.id, &job_id.to_string(), expected_status, &update)
            .await
    }

    /// Notify the requester and, for failures with budget left, hand the
    /// snapshot to the retry orchestrator. Returns whether a retry was accepted.
    async fn on_terminal(&self, snapshot: &Snapshot, job: &ProviderJob) -> bool {
        let failed = job.status == JobStatus::Failed;
        let will_retry = failed && self.settings.auto_retry && !snapshot.budget_exhausted();
        let permanent = failed && snapshot.budget_exhausted();

        let notification = Notification {
            user_id: snapshot.created_by.clone(),
            outcome: if failed {
                Outcome::Failed
            } else {
                Outcome::Succeeded
            },
            job_id: job.id.clone(),
            snapshot_id: snapshot.id.clone(),
            snapshot_name: snapshot.name.clone(),
            permanent,
            message: job.error.clone().or_else(|| job.model.clone()),
        };
        if let Err(e) = self.notifier.notify(&notification).await {
            // Notification is best effort; the stored status is authoritative
            warn!(snapshot_id = %snapshot.id, error = %e, "Notification failed");
        }

        if permanent {
            warn!(
                snapshot_id = %snapshot.id,
                job_id = %job.id,
                retry_count = snapshot.retry_count,
                "Job failed permanently, retry budget spent"
            );
        }
        if !will_retry {
            return false;
        }

        let reason = job
            .error
            .clone()
            .unwrap_or_else(|| format!("job {} failed", job.id));
        self.auto_retry(snapshot, reason).await == AutoRetry::Accepted
    }

    async fn auto_retry(&self, snapshot: &Snapshot, reason: String) -> AutoRetry {
        let request = RetryRequest::for_snapshot(&snapshot.id, RetryOrigin::Webhook)
            .with_reason(reason)
            .requested_by(&snapshot.created_by);

        match self.retry.retry(request).await {
            Ok(outcome) => {
                info!(
                    snapshot_id = %outcome.snapshot_id,
                    job_id = %outcome.job_id,
                    retry_count = outcome.retry_count,
                    "Automatic retry submitted"
                );
                AutoRetry::Accepted
            }
            Err(e @ (AppError::LockHeld { .. } | AppError::CooldownActive { .. })) => {
                info!(
                    snapshot_id = %snapshot.id,
                    reason = %e,
                    "Automatic retry deferred to a later pass"
                );
                AutoRetry::Deferred
            }
            Err(e) => {
                warn!(snapshot_id = %snapshot.id, error = %e, "Automatic retry rejected");
                AutoRetry::Rejected
            }
        }
    }
}
