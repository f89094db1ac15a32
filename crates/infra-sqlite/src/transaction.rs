// SQLite Transaction Implementation (dedup gate + insert)

use crate::error::map_sqlx_error;
use crate::snapshot_repository::{insert_snapshot, SnapshotRow, SNAPSHOT_COLUMNS};
use async_trait::async_trait;
use sqlx::{Sqlite, Transaction as SqlxTransaction};
use tunekeeper_core::domain::{Snapshot, SnapshotId};
use tunekeeper_core::error::Result;
use tunekeeper_core::port::{SnapshotRepositoryTransaction, Transaction};

pub struct SqliteSnapshotTransaction {
    tx: SqlxTransaction<'static, Sqlite>,
}

impl SqliteSnapshotTransaction {
    pub fn new(tx: SqlxTransaction<'static, Sqlite>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl Transaction for SqliteSnapshotTransaction {
    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await.map_err(map_sqlx_error)
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await.map_err(map_sqlx_error)
    }
}

#[async_trait]
impl SnapshotRepositoryTransaction for SqliteSnapshotTransaction {
    async fn find_latest(&mut self) -> Result<Option<Snapshot>> {
        let row = sqlx::query_as::<_, SnapshotRow>(&format!(
            "SELECT {} FROM snapshots ORDER BY created_at DESC, id DESC LIMIT 1",
            SNAPSHOT_COLUMNS
        ))
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        row.map(SnapshotRow::into_snapshot).transpose()
    }

    async fn find_fresh_by_hash(&mut self, filter_hash: &str) -> Result<Option<Snapshot>> {
        let row = sqlx::query_as::<_, SnapshotRow>(&format!(
            "SELECT {} FROM snapshots WHERE filter_hash = ? AND stale = 0",
            SNAPSHOT_COLUMNS
        ))
        .bind(filter_hash)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        row.map(SnapshotRow::into_snapshot).transpose()
    }

    async fn mark_stale(&mut self, filter_hash: &str, except: &SnapshotId) -> Result<u64> {
        let result =
            sqlx::query("UPDATE snapshots SET stale = 1 WHERE filter_hash = ? AND stale = 0 AND id != ?")
                .bind(filter_hash)
                .bind(except)
                .execute(&mut *self.tx)
                .await
                .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn insert(&mut self, snapshot: &Snapshot) -> Result<()> {
        insert_snapshot(&mut *self.tx, snapshot).await
    }
}
