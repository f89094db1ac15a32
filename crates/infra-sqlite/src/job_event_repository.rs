// SQLite JobEventRepository Implementation

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use sqlx::SqlitePool;
use tunekeeper_core::domain::{JobEvent, JobId, RetryOrigin, SnapshotId};
use tunekeeper_core::error::Result;
use tunekeeper_core::port::JobEventRepository;

const EVENT_COLUMNS: &str =
    "job_id, snapshot_id, user_id, status, message, retry_origin, retry_reason, created_at";

pub struct SqliteJobEventRepository {
    pool: SqlitePool,
}

impl SqliteJobEventRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn fetch_latest(&self, filter: &str, key: &str) -> Result<Option<JobEvent>> {
        let row = sqlx::query_as::<_, JobEventRow>(&format!(
            "SELECT {} FROM job_events WHERE {} ORDER BY created_at DESC, id DESC LIMIT 1",
            EVENT_COLUMNS, filter
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(JobEventRow::into_event).transpose()
    }
}

#[async_trait]
impl JobEventRepository for SqliteJobEventRepository {
    async fn record(&self, event: &JobEvent) -> Result<bool> {
        let result = sqlx::query(&format!(
            "INSERT INTO job_events ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(job_id, status) DO NOTHING",
            EVENT_COLUMNS
        ))
        .bind(&event.job_id)
        .bind(&event.snapshot_id)
        .bind(&event.user_id)
        .bind(event.status.as_str())
        .bind(&event.message)
        .bind(event.retry_origin.map(|o| o.as_str()))
        .bind(&event.retry_reason)
        .bind(event.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn latest_retry_for_snapshot(
        &self,
        snapshot_id: &SnapshotId,
    ) -> Result<Option<JobEvent>> {
        self.fetch_latest("snapshot_id = ? AND retry_origin IS NOT NULL", snapshot_id)
            .await
    }

    async fn latest_for_job(&self, job_id: &JobId) -> Result<Option<JobEvent>> {
        self.fetch_latest("job_id = ?", job_id).await
    }

    async fn list_for_snapshot(&self, snapshot_id: &SnapshotId) -> Result<Vec<JobEvent>> {
        let rows = sqlx::query_as::<_, JobEventRow>(&format!(
            "SELECT {} FROM job_events WHERE snapshot_id = ? ORDER BY created_at ASC, id ASC",
            EVENT_COLUMNS
        ))
        .bind(snapshot_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(JobEventRow::into_event).collect()
    }
}

#[derive(Debug, sqlx::FromRow)]
struct JobEventRow {
    job_id: String,
    snapshot_id: String,
    user_id: String,
    status: String,
    message: Option<String>,
    retry_origin: Option<String>,
    retry_reason: Option<String>,
    created_at: i64,
}

impl JobEventRow {
    fn into_event(self) -> Result<JobEvent> {
        let retry_origin = self
            .retry_origin
            .as_deref()
            .map(str::parse::<RetryOrigin>)
            .transpose()?;

        Ok(JobEvent {
            job_id: self.job_id,
            snapshot_id: self.snapshot_id,
            user_id: self.user_id,
            status: self.status.parse()?,
            message: self.message,
            retry_origin,
            retry_reason: self.retry_reason,
            created_at: self.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{setup_test_db, snapshot};
    use crate::SqliteSnapshotRepository;
    use tunekeeper_core::domain::JobStatus;
    use tunekeeper_core::port::SnapshotRepository;

    async fn setup() -> SqliteJobEventRepository {
        let pool = setup_test_db().await;
        let snapshots = SqliteSnapshotRepository::new(pool.clone());
        snapshots.insert(&snapshot("snap-1", "hash-a", 1_000)).await.unwrap();
        SqliteJobEventRepository::new(pool)
    }

    #[tokio::test]
    async fn test_record_is_idempotent_per_job_and_status() {
        let repo = setup().await;
        let event = JobEvent::new("ftjob-1", "snap-1", "user-1", JobStatus::Running, 2_000);

        assert!(repo.record(&event).await.unwrap());
        assert!(!repo.record(&event).await.unwrap());

        let failed = JobEvent::new("ftjob-1", "snap-1", "user-1", JobStatus::Failed, 3_000)
            .with_message("bad file");
        assert!(repo.record(&failed).await.unwrap());

        let history = repo.list_for_snapshot(&"snap-1".to_string()).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].status, JobStatus::Running);
        assert_eq!(history[1].message.as_deref(), Some("bad file"));
    }

    #[tokio::test]
    async fn test_latest_lookups() {
        let repo = setup().await;
        repo.record(&JobEvent::new("ftjob-1", "snap-1", "u", JobStatus::Failed, 2_000))
            .await
            .unwrap();
        repo.record(
            &JobEvent::new("ftjob-2", "snap-1", "u", JobStatus::ValidatingFiles, 3_000)
                .with_retry(RetryOrigin::Webhook, Some("auto".to_string())),
        )
        .await
        .unwrap();
        repo.record(&JobEvent::new("ftjob-2", "snap-1", "u", JobStatus::Running, 4_000))
            .await
            .unwrap();

        let latest = repo.latest_for_job(&"ftjob-2".to_string()).await.unwrap().unwrap();
        assert_eq!(latest.status, JobStatus::Running);

        let retry = repo
            .latest_retry_for_snapshot(&"snap-1".to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(retry.created_at, 3_000);
        assert_eq!(retry.retry_origin, Some(RetryOrigin::Webhook));
        assert_eq!(retry.retry_reason.as_deref(), Some("auto"));

        let by_job = repo.latest_for_job(&"ftjob-1".to_string()).await.unwrap().unwrap();
        assert_eq!(by_job.snapshot_id, "snap-1");
        assert!(repo.latest_for_job(&"nope".to_string()).await.unwrap().is_none());
    }
}
