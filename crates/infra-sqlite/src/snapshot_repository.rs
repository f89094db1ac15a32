// SQLite SnapshotRepository Implementation

use crate::error::map_sqlx_error;
use crate::transaction::SqliteSnapshotTransaction;
use async_trait::async_trait;
use sqlx::query::Query;
use sqlx::sqlite::SqliteArguments;
use sqlx::{Sqlite, SqlitePool};
use tunekeeper_core::domain::{FilterSpec, JobId, JobStatus, Snapshot, SnapshotId};
use tunekeeper_core::error::Result;
use tunekeeper_core::port::{
    SnapshotRepository, SnapshotRepositoryTransaction, StatusUpdate,
    TransactionalSnapshotRepository,
};

pub(crate) const SNAPSHOT_COLUMNS: &str = "id, name, filter_spec, filter_hash, version, created_by, \
     job_id, file_id, model_version, job_status, retry_count, max_retries, \
     example_count, error_message, stale, created_at, updated_at, completed_at";

const UPDATE_SNAPSHOT: &str = r#"
    UPDATE snapshots
    SET version = ?, job_id = ?, file_id = ?, model_version = ?,
        job_status = ?, retry_count = ?, example_count = ?,
        error_message = ?, stale = ?, updated_at = ?, completed_at = ?
    WHERE id = ?"#;

pub struct SqliteSnapshotRepository {
    pool: SqlitePool,
}

impl SqliteSnapshotRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Insert on any executor (pool or open transaction)
pub(crate) async fn insert_snapshot<'e, E>(executor: E, snapshot: &Snapshot) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let filter_spec = snapshot.filter_spec.canonical_json()?;

    sqlx::query(&format!(
        "INSERT INTO snapshots ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        SNAPSHOT_COLUMNS
    ))
    .bind(&snapshot.id)
    .bind(&snapshot.name)
    .bind(filter_spec)
    .bind(&snapshot.filter_hash)
    .bind(&snapshot.version)
    .bind(&snapshot.created_by)
    .bind(&snapshot.job_id)
    .bind(&snapshot.file_id)
    .bind(&snapshot.model_version)
    .bind(snapshot.job_status.as_str())
    .bind(snapshot.retry_count)
    .bind(snapshot.max_retries)
    .bind(snapshot.example_count)
    .bind(&snapshot.error_message)
    .bind(snapshot.stale)
    .bind(snapshot.created_at)
    .bind(snapshot.updated_at)
    .bind(snapshot.completed_at)
    .execute(executor)
    .await
    .map_err(map_sqlx_error)?;

    Ok(())
}

fn bind_update<'q>(
    sql: &'q str,
    snapshot: &'q Snapshot,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    sqlx::query(sql)
        .bind(&snapshot.version)
        .bind(&snapshot.job_id)
        .bind(&snapshot.file_id)
        .bind(&snapshot.model_version)
        .bind(snapshot.job_status.as_str())
        .bind(snapshot.retry_count)
        .bind(snapshot.example_count)
        .bind(&snapshot.error_message)
        .bind(snapshot.stale)
        .bind(snapshot.updated_at)
        .bind(snapshot.completed_at)
        .bind(&snapshot.id)
}

#[async_trait]
impl SnapshotRepository for SqliteSnapshotRepository {
    async fn insert(&self, snapshot: &Snapshot) -> Result<()> {
        insert_snapshot(&self.pool, snapshot).await
    }

    async fn find_by_id(&self, id: &SnapshotId) -> Result<Option<Snapshot>> {
        let row = sqlx::query_as::<_, SnapshotRow>(&format!(
            "SELECT {} FROM snapshots WHERE id = ?",
            SNAPSHOT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(SnapshotRow::into_snapshot).transpose()
    }

    async fn find_by_job_id(&self, job_id: &JobId) -> Result<Option<Snapshot>> {
        let row = sqlx::query_as::<_, SnapshotRow>(&format!(
            "SELECT {} FROM snapshots WHERE job_id = ? ORDER BY created_at DESC LIMIT 1",
            SNAPSHOT_COLUMNS
        ))
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(SnapshotRow::into_snapshot).transpose()
    }

    async fn update(&self, snapshot: &Snapshot) -> Result<()> {
        bind_update(UPDATE_SNAPSHOT, snapshot)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn update_if_unchanged(
        &self,
        snapshot: &Snapshot,
        expected_status: JobStatus,
        expected_job_id: Option<&JobId>,
    ) -> Result<bool> {
        let sql = format!("{} AND job_status = ? AND job_id IS ?", UPDATE_SNAPSHOT);
        let result = bind_update(&sql, snapshot)
            .bind(expected_status.as_str())
            .bind(expected_job_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn update_job_status(
        &self,
        id: &SnapshotId,
        job_id: &JobId,
        expected_status: JobStatus,
        update: &StatusUpdate,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE snapshots
            SET job_status = ?,
                model_version = COALESCE(?, model_version),
                error_message = COALESCE(?, error_message),
                completed_at = ?,
                updated_at = ?
            WHERE id = ? AND job_id = ? AND job_status = ?
            "#,
        )
        .bind(update.status.as_str())
        .bind(&update.model_version)
        .bind(&update.error_message)
        .bind(update.completed_at)
        .bind(update.updated_at)
        .bind(id)
        .bind(job_id)
        .bind(expected_status.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_in_flight(&self) -> Result<Vec<Snapshot>> {
        let rows = sqlx::query_as::<_, SnapshotRow>(&format!(
            r#"
            SELECT {} FROM snapshots
            WHERE job_id IS NOT NULL
              AND job_status IN ('pending', 'uploading', 'validating_files', 'queued', 'running')
            ORDER BY created_at ASC
            "#,
            SNAPSHOT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(SnapshotRow::into_snapshot).collect()
    }

    async fn find_retry_candidates(&self) -> Result<Vec<Snapshot>> {
        let rows = sqlx::query_as::<_, SnapshotRow>(&format!(
            r#"
            SELECT {} FROM snapshots
            WHERE job_status = 'failed'
              AND job_id IS NOT NULL
              AND stale = 0
              AND retry_count < max_retries
            ORDER BY updated_at ASC
            "#,
            SNAPSHOT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(SnapshotRow::into_snapshot).collect()
    }

    async fn list(
        &self,
        status: Option<JobStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Snapshot>> {
        let status = status.map(|s| s.as_str());
        let rows = sqlx::query_as::<_, SnapshotRow>(&format!(
            r#"
            SELECT {} FROM snapshots
            WHERE (? IS NULL OR job_status = ?)
            ORDER BY created_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
            SNAPSHOT_COLUMNS
        ))
        .bind(status)
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(SnapshotRow::into_snapshot).collect()
    }

    async fn count_by_status(&self, status: JobStatus) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM snapshots WHERE job_status = ?")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }
}

#[async_trait]
impl TransactionalSnapshotRepository for SqliteSnapshotRepository {
    async fn begin_transaction(&self) -> Result<Box<dyn SnapshotRepositoryTransaction>> {
        let tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        Ok(Box::new(SqliteSnapshotTransaction::new(tx)))
    }
}

/// SQLite row representation
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SnapshotRow {
    id: String,
    name: String,
    filter_spec: String, // canonical JSON
    filter_hash: String,
    version: String,
    created_by: String,
    job_id: Option<String>,
    file_id: Option<String>,
    model_version: Option<String>,
    job_status: String,
    retry_count: i32,
    max_retries: i32,
    example_count: Option<i64>,
    error_message: Option<String>,
    stale: bool,
    created_at: i64,
    updated_at: i64,
    completed_at: Option<i64>,
}

impl SnapshotRow {
    pub(crate) fn into_snapshot(self) -> Result<Snapshot> {
        let filter_spec: FilterSpec = serde_json::from_str(&self.filter_spec)?;
        let job_status: JobStatus = self.job_status.parse()?;

        Ok(Snapshot {
            id: self.id,
            name: self.name,
            filter_spec,
            filter_hash: self.filter_hash,
            version: self.version,
            created_by: self.created_by,
            job_id: self.job_id,
            file_id: self.file_id,
            model_version: self.model_version,
            job_status,
            retry_count: self.retry_count,
            max_retries: self.max_retries,
            example_count: self.example_count,
            error_message: self.error_message,
            stale: self.stale,
            created_at: self.created_at,
            updated_at: self.updated_at,
            completed_at: self.completed_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{setup_test_db, snapshot};
    use tunekeeper_core::error::AppError;

    #[tokio::test]
    async fn test_insert_and_find() {
        let pool = setup_test_db().await;
        let repo = SqliteSnapshotRepository::new(pool);

        let mut s = snapshot("snap-1", "hash-a", 1_000);
        s.filter_spec.tags.insert("cbt".to_string());
        repo.insert(&s).await.unwrap();

        let found = repo.find_by_id(&s.id).await.unwrap().unwrap();
        assert_eq!(found.name, s.name);
        assert_eq!(found.filter_spec, s.filter_spec);
        assert_eq!(found.job_status, JobStatus::Uploading);
        assert!(!found.stale);

        assert!(repo.find_by_id(&"missing".to_string()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fresh_hash_is_unique() {
        let pool = setup_test_db().await;
        let repo = SqliteSnapshotRepository::new(pool);

        repo.insert(&snapshot("snap-1", "hash-a", 1_000)).await.unwrap();
        let err = repo
            .insert(&snapshot("snap-2", "hash-a", 2_000))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        // A stale row does not occupy the index
        let mut stale = snapshot("snap-3", "hash-b", 3_000);
        stale.stale = true;
        repo.insert(&stale).await.unwrap();
        repo.insert(&snapshot("snap-4", "hash-b", 4_000)).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_job_status_guarded_by_job_id() {
        let pool = setup_test_db().await;
        let repo = SqliteSnapshotRepository::new(pool);

        let mut s = snapshot("snap-1", "hash-a", 1_000);
        s.record_submission("ftjob-1", "file-1", JobStatus::ValidatingFiles, None, 1_500);
        repo.insert(&s).await.unwrap();

        let update = StatusUpdate {
            status: JobStatus::Succeeded,
            model_version: Some("ft:model".to_string()),
            error_message: None,
            completed_at: Some(2_000),
            updated_at: 2_000,
        };

        let stale_job = repo
            .update_job_status(&s.id, &"ftjob-old".to_string(), JobStatus::ValidatingFiles, &update)
            .await
            .unwrap();
        assert!(!stale_job);

        let stale_status = repo
            .update_job_status(&s.id, &"ftjob-1".to_string(), JobStatus::Running, &update)
            .await
            .unwrap();
        assert!(!stale_status);

        let applied = repo
            .update_job_status(&s.id, &"ftjob-1".to_string(), JobStatus::ValidatingFiles, &update)
            .await
            .unwrap();
        assert!(applied);

        // A second writer holding the same observation loses
        let again = repo
            .update_job_status(&s.id, &"ftjob-1".to_string(), JobStatus::ValidatingFiles, &update)
            .await
            .unwrap();
        assert!(!again);

        let found = repo.find_by_id(&s.id).await.unwrap().unwrap();
        assert_eq!(found.job_status, JobStatus::Succeeded);
        assert_eq!(found.model_version.as_deref(), Some("ft:model"));
        assert_eq!(found.completed_at, Some(2_000));
    }

    #[tokio::test]
    async fn test_find_in_flight_skips_terminal_retrying_and_unsubmitted() {
        let pool = setup_test_db().await;
        let repo = SqliteSnapshotRepository::new(pool);

        let unsubmitted = snapshot("snap-1", "hash-1", 1_000);

        let mut running = snapshot("snap-2", "hash-2", 2_000);
        running.record_submission("ftjob-2", "file-2", JobStatus::Running, None, 2_000);

        let mut done = snapshot("snap-3", "hash-3", 3_000);
        done.record_submission("ftjob-3", "file-3", JobStatus::Succeeded, None, 3_000);

        let mut retrying = snapshot("snap-4", "hash-4", 4_000);
        retrying.record_submission("ftjob-4", "file-4", JobStatus::Failed, None, 4_000);
        retrying.transition_to(JobStatus::Retrying, 4_100).unwrap();

        for s in [&unsubmitted, &running, &done, &retrying] {
            repo.insert(s).await.unwrap();
        }

        let in_flight = repo.find_in_flight().await.unwrap();
        let ids: Vec<_> = in_flight.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["snap-2"]);
    }

    #[tokio::test]
    async fn test_update_if_unchanged_detects_concurrent_write() {
        let pool = setup_test_db().await;
        let repo = SqliteSnapshotRepository::new(pool);

        let mut s = snapshot("snap-1", "hash-a", 1_000);
        s.record_submission("ftjob-1", "file-1", JobStatus::Running, None, 1_500);
        repo.insert(&s).await.unwrap();
        let job = s.job_id.clone();

        // Someone else finishes the job after `s` was read
        let update = StatusUpdate {
            status: JobStatus::Succeeded,
            model_version: None,
            error_message: None,
            completed_at: Some(2_000),
            updated_at: 2_000,
        };
        assert!(repo
            .update_job_status(&s.id, &"ftjob-1".to_string(), JobStatus::Running, &update)
            .await
            .unwrap());

        let mut retrying = s.clone();
        retrying.transition_to(JobStatus::Retrying, 2_500).unwrap();
        let applied = repo
            .update_if_unchanged(&retrying, JobStatus::Running, job.as_ref())
            .await
            .unwrap();
        assert!(!applied);
        let found = repo.find_by_id(&s.id).await.unwrap().unwrap();
        assert_eq!(found.job_status, JobStatus::Succeeded);

        // Unsubmitted rows match on a NULL job id
        let fresh = snapshot("snap-2", "hash-b", 3_000);
        repo.insert(&fresh).await.unwrap();
        let mut failed = fresh.clone();
        failed.mark_failed("upload failed", 3_500).unwrap();
        assert!(repo
            .update_if_unchanged(&failed, JobStatus::Uploading, None)
            .await
            .unwrap());
        let found = repo.find_by_id(&fresh.id).await.unwrap().unwrap();
        assert_eq!(found.job_status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_find_retry_candidates() {
        let pool = setup_test_db().await;
        let repo = SqliteSnapshotRepository::new(pool);

        let mut candidate = snapshot("snap-1", "hash-1", 1_000);
        candidate.record_submission("ftjob-1", "file-1", JobStatus::Failed, None, 1_000);

        let mut spent = snapshot("snap-2", "hash-2", 2_000);
        spent.record_submission("ftjob-2", "file-2", JobStatus::Failed, None, 2_000);
        spent.retry_count = spent.max_retries;

        let mut never_submitted = snapshot("snap-3", "hash-3", 3_000);
        never_submitted.mark_failed("upload failed", 3_000).unwrap();

        let mut superseded = snapshot("snap-4", "hash-4", 4_000);
        superseded.record_submission("ftjob-4", "file-4", JobStatus::Failed, None, 4_000);
        superseded.stale = true;

        let mut running = snapshot("snap-5", "hash-5", 5_000);
        running.record_submission("ftjob-5", "file-5", JobStatus::Running, None, 5_000);

        for s in [&candidate, &spent, &never_submitted, &superseded, &running] {
            repo.insert(s).await.unwrap();
        }

        let ids: Vec<_> = repo
            .find_retry_candidates()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec!["snap-1"]);
    }

    #[tokio::test]
    async fn test_list_and_count() {
        let pool = setup_test_db().await;
        let repo = SqliteSnapshotRepository::new(pool);

        for i in 0..5 {
            let mut s = snapshot(&format!("snap-{}", i), &format!("hash-{}", i), 1_000 * i);
            if i % 2 == 0 {
                s.mark_failed("boom", 1_000 * i).unwrap();
            }
            repo.insert(&s).await.unwrap();
        }

        let all = repo.list(None, 10, 0).await.unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(all[0].id, "snap-4"); // newest first

        let page = repo.list(None, 2, 2).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].id, "snap-2");

        let failed = repo.list(Some(JobStatus::Failed), 10, 0).await.unwrap();
        assert_eq!(failed.len(), 3);
        assert_eq!(repo.count_by_status(JobStatus::Failed).await.unwrap(), 3);
        assert_eq!(repo.count_by_status(JobStatus::Uploading).await.unwrap(), 2);
    }
}
