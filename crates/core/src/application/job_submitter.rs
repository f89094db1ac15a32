// Job Submitter - hands exports to the training provider
use crate::application::backoff::retry_with_backoff;
use crate::application::settings::LifecycleSettings;
use crate::domain::{JobEvent, RetryOrigin, Snapshot};
use crate::error::{AppError, Result};
use crate::port::{
    ExportPayload, JobEventRepository, ProviderJob, SnapshotRepository, TimeProvider,
    TrainingProvider,
};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Why a submission happens (initial export or a retry)
#[derive(Debug, Clone, Default)]
pub struct SubmissionContext {
    pub retry_origin: Option<RetryOrigin>,
    pub retry_reason: Option<String>,
    /// Identity recorded on the job event
    pub user_id: Option<String>,
}

impl SubmissionContext {
    pub fn initial() -> Self {
        Self::default()
    }

    pub fn retry(origin: RetryOrigin, reason: Option<String>, user_id: impl Into<String>) -> Self {
        Self {
            retry_origin: Some(origin),
            retry_reason: reason,
            user_id: Some(user_id.into()),
        }
    }
}

pub struct JobSubmitter {
    snapshot_repo: Arc<dyn SnapshotRepository>,
    event_repo: Arc<dyn JobEventRepository>,
    provider: Arc<dyn TrainingProvider>,
    time_provider: Arc<dyn TimeProvider>,
    settings: LifecycleSettings,
}

impl JobSubmitter {
    pub fn new(
        snapshot_repo: Arc<dyn SnapshotRepository>,
        event_repo: Arc<dyn JobEventRepository>,
        provider: Arc<dyn TrainingProvider>,
        time_provider: Arc<dyn TimeProvider>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            snapshot_repo,
            event_repo,
            provider,
            time_provider,
            settings,
        }
    }

    /// Upload `payload`, create the remote job and record it on `snapshot`.
    ///
    /// The poller picks the job up on its next pass by querying storage; it
    /// is not told about it here.
    ///
    /// # Errors
    /// - `AppError::ExternalService` if the upload or job creation fails after
    ///   retries, whatever the adapter reported (rejected credentials included).
    ///   The snapshot is left `failed` with no job id and no retry budget
    ///   consumed.
    pub async fn submit(
        &self,
        snapshot: &mut Snapshot,
        payload: ExportPayload,
        ctx: SubmissionContext,
    ) -> Result<ProviderJob> {
        let max_attempts = self.settings.provider_max_attempts;
        let base_delay = self.settings.provider_base_delay();

        let upload = retry_with_backoff("upload_file", max_attempts, base_delay, || {
            self.provider
                .upload_file(payload.bytes.clone(), &payload.filename)
        })
        .await;

        let file_id = match upload {
            Ok(file_id) => file_id,
            Err(e) => return Err(self.fail_before_job(snapshot, "upload", e).await),
        };

        let model_hint = self.settings.base_model.as_str();
        let created = retry_with_backoff("create_job", max_attempts, base_delay, || {
            self.provider.create_job(&file_id, model_hint)
        })
        .await;

        let job = match created {
            Ok(job) => job,
            Err(e) => return Err(self.fail_before_job(snapshot, "create_job", e).await),
        };

        let now = self.time_provider.now_millis();
        snapshot.example_count = Some(payload.example_count);
        if !snapshot.record_submission(&job.id, &file_id, job.status, job.model.clone(), now) {
            warn!(
                snapshot_id = %snapshot.id,
                job_id = %job.id,
                from = %snapshot.job_status,
                reported = %job.status,
                "Unexpected initial job status, leaving it to the poller"
            );
        }
        if ctx.retry_origin.is_some() {
            // Budget is consumed only once a remote job exists
            snapshot.complete_retry(now);
        }
        self.snapshot_repo.update(snapshot).await.map_err(|e| {
            error!(
                snapshot_id = %snapshot.id,
                job_id = %job.id,
                error = %e,
                "Remote job created but not recorded"
            );
            e
        })?;

        let user_id = ctx
            .user_id
            .unwrap_or_else(|| snapshot.created_by.clone());
        let mut event = JobEvent::new(&job.id, &snapshot.id, user_id, job.status, now)
            .with_message(format!(
                "job submitted ({} examples, file {})",
                payload.example_count, file_id
            ));
        if let Some(origin) = ctx.retry_origin {
            event = event.with_retry(origin, ctx.retry_reason);
        }
        self.event_repo.record(&event).await?;

        info!(
            snapshot_id = %snapshot.id,
            job_id = %job.id,
            file_id = %file_id,
            status = %job.status,
            retry_origin = ?event.retry_origin,
            "Training job submitted"
        );

        Ok(job)
    }

    /// Leave the snapshot in a failed pre-submission state and build the error
    async fn fail_before_job(&self, snapshot: &mut Snapshot, stage: &str, err: AppError) -> AppError {
        let now = self.time_provider.now_millis();
        let reason = format!("{} failed: {}", stage, err);

        error!(
            snapshot_id = %snapshot.id,
            stage = stage,
            error = %err,
            "Submission failed before a job existed"
        );

        if let Err(e) = snapshot.mark_failed(&reason, now) {
            error!(snapshot_id = %snapshot.id, error = %e, "Cannot mark snapshot failed");
        } else if let Err(e) = self.snapshot_repo.update(snapshot).await {
            error!(snapshot_id = %snapshot.id, error = %e, "Failed to persist submission failure");
        }

        AppError::ExternalService(reason)
    }
}
