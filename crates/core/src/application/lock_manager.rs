// Lock Manager - time-boxed mutual exclusion per snapshot
use crate::domain::{Lock, LockContext, SnapshotId};
use crate::error::{AppError, Result};
use crate::port::{IdProvider, LockAcquisition, LockRepository, TimeProvider};
use std::sync::Arc;
use tracing::{info, warn};

/// Grants and revokes snapshot locks.
///
/// There is no in-process mutex here: exclusion comes entirely from the
/// repository's atomic conditional insert, so it holds across processes.
pub struct LockManager {
    lock_repo: Arc<dyn LockRepository>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
    ttl_ms: i64,
}

impl LockManager {
    pub fn new(
        lock_repo: Arc<dyn LockRepository>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
        ttl_ms: i64,
    ) -> Self {
        Self {
            lock_repo,
            id_provider,
            time_provider,
            ttl_ms,
        }
    }

    /// Acquire the lock for `snapshot_id` with a generated holder id
    ///
    /// # Errors
    /// - `AppError::LockHeld` with the current holder's `expires_at`
    pub async fn acquire(&self, snapshot_id: &SnapshotId, context: LockContext) -> Result<Lock> {
        let holder_id = self.id_provider.generate_id();
        let now = self.time_provider.now_millis();
        let lock = Lock::new(snapshot_id.clone(), holder_id, context, now, self.ttl_ms);

        match self.lock_repo.try_acquire(&lock).await? {
            LockAcquisition::Acquired(lock) => {
                info!(
                    snapshot_id = %lock.snapshot_id,
                    holder_id = %lock.holder_id,
                    context = %lock.context,
                    expires_at = lock.expires_at,
                    "Lock acquired"
                );
                Ok(lock)
            }
            LockAcquisition::Held(existing) => {
                warn!(
                    snapshot_id = %existing.snapshot_id,
                    holder_id = %existing.holder_id,
                    context = %existing.context,
                    remaining_ms = existing.remaining_ms(now),
                    "Lock held by another operation"
                );
                Err(AppError::LockHeld {
                    snapshot_id: existing.snapshot_id,
                    expires_at: existing.expires_at,
                })
            }
        }
    }

    /// Current unexpired lock, if any
    pub async fn active(&self, snapshot_id: &SnapshotId) -> Result<Option<Lock>> {
        let now = self.time_provider.now_millis();
        self.lock_repo.find_active(snapshot_id, now).await
    }

    /// Administrative override: delete the lock regardless of holder or expiry
    pub async fn force_release(&self, snapshot_id: &SnapshotId) -> Result<bool> {
        let released = self.lock_repo.delete(snapshot_id).await?;
        warn!(snapshot_id = %snapshot_id, released, "Lock override requested");
        Ok(released)
    }

    pub fn now_millis(&self) -> i64 {
        self.time_provider.now_millis()
    }
}
