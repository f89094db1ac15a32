// Transaction port for atomic snapshot creation

use crate::domain::{Snapshot, SnapshotId};
use crate::error::Result;
use async_trait::async_trait;

/// Transaction trait for atomic multi-step operations
#[async_trait]
pub trait Transaction: Send {
    /// Commit the transaction
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Transactional SnapshotRepository operations
#[async_trait]
pub trait TransactionalSnapshotRepository: Send + Sync {
    /// Begin a new transaction
    async fn begin_transaction(&self) -> Result<Box<dyn SnapshotRepositoryTransaction>>;
}

/// SnapshotRepository operations within a transaction (dedup gate + insert)
#[async_trait]
pub trait SnapshotRepositoryTransaction: Transaction {
    /// Most recently created snapshot overall (within transaction)
    async fn find_latest(&mut self) -> Result<Option<Snapshot>>;

    /// Non-stale snapshot with this filter hash (within transaction)
    async fn find_fresh_by_hash(&mut self, filter_hash: &str) -> Result<Option<Snapshot>>;

    /// Mark every non-stale snapshot with this hash as stale (within transaction)
    async fn mark_stale(&mut self, filter_hash: &str, except: &SnapshotId) -> Result<u64>;

    /// Insert snapshot (within transaction)
    async fn insert(&mut self, snapshot: &Snapshot) -> Result<()>;
}
