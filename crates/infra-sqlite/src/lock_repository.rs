// SQLite LockRepository Implementation

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::debug;
use tunekeeper_core::domain::{Lock, LockContext, SnapshotId};
use tunekeeper_core::error::{AppError, Result};
use tunekeeper_core::port::{LockAcquisition, LockRepository};

/// Holder lookups after a refused upsert; the row can vanish in between
/// when an override races the acquire
const ACQUIRE_ATTEMPTS: usize = 3;

pub struct SqliteLockRepository {
    pool: SqlitePool,
}

impl SqliteLockRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn find_any(&self, snapshot_id: &SnapshotId) -> Result<Option<Lock>> {
        let row = sqlx::query_as::<_, LockRow>(
            "SELECT snapshot_id, holder_id, context, acquired_at, expires_at FROM locks WHERE snapshot_id = ?",
        )
        .bind(snapshot_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(LockRow::into_lock).transpose()
    }
}

#[async_trait]
impl LockRepository for SqliteLockRepository {
    async fn try_acquire(&self, lock: &Lock) -> Result<LockAcquisition> {
        for _ in 0..ACQUIRE_ATTEMPTS {
            // Insert, or take over a row that expired at or before our start.
            // One statement, so two callers can never both see rows_affected = 1.
            let result = sqlx::query(
                r#"
                INSERT INTO locks (snapshot_id, holder_id, context, acquired_at, expires_at)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(snapshot_id) DO UPDATE SET
                    holder_id = excluded.holder_id,
                    context = excluded.context,
                    acquired_at = excluded.acquired_at,
                    expires_at = excluded.expires_at
                WHERE locks.expires_at <= excluded.acquired_at
                "#,
            )
            .bind(&lock.snapshot_id)
            .bind(&lock.holder_id)
            .bind(lock.context.as_str())
            .bind(lock.acquired_at)
            .bind(lock.expires_at)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

            if result.rows_affected() == 1 {
                return Ok(LockAcquisition::Acquired(lock.clone()));
            }

            match self.find_any(&lock.snapshot_id).await? {
                Some(existing) => return Ok(LockAcquisition::Held(existing)),
                None => debug!(snapshot_id = %lock.snapshot_id, "Lock released mid-acquire, retrying"),
            }
        }

        Err(AppError::Conflict(format!(
            "Lock for snapshot {} is contended",
            lock.snapshot_id
        )))
    }

    async fn find_active(&self, snapshot_id: &SnapshotId, now_millis: i64) -> Result<Option<Lock>> {
        let row = sqlx::query_as::<_, LockRow>(
            r#"
            SELECT snapshot_id, holder_id, context, acquired_at, expires_at
            FROM locks
            WHERE snapshot_id = ? AND expires_at > ?
            "#,
        )
        .bind(snapshot_id)
        .bind(now_millis)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(LockRow::into_lock).transpose()
    }

    async fn delete(&self, snapshot_id: &SnapshotId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM locks WHERE snapshot_id = ?")
            .bind(snapshot_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LockRow {
    snapshot_id: String,
    holder_id: String,
    context: String,
    acquired_at: i64,
    expires_at: i64,
}

impl LockRow {
    fn into_lock(self) -> Result<Lock> {
        let context: LockContext = self.context.parse()?;
        Ok(Lock {
            snapshot_id: self.snapshot_id,
            holder_id: self.holder_id,
            context,
            acquired_at: self.acquired_at,
            expires_at: self.expires_at,
        })
    }
}
