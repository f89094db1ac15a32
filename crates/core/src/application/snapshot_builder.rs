// Snapshot Builder - create a versioned export and submit it
use crate::application::job_submitter::{JobSubmitter, SubmissionContext};
use crate::application::lock_manager::LockManager;
use crate::application::settings::LifecycleSettings;
use crate::application::constants::MAX_SNAPSHOT_NAME_LEN;
use crate::domain::{FilterSpec, LockContext, Snapshot, SnapshotId};
use crate::error::{AppError, Result};
use crate::port::{
    IdProvider, SnapshotRepositoryTransaction, TimeProvider, TrainingDataSource, Transaction,
    TransactionalSnapshotRepository,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Create-snapshot request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSnapshotRequest {
    pub filter_spec: FilterSpec,
    pub name: String,
    pub requested_by: String,
}

/// Result of a successful create: the snapshot and its first job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedSnapshot {
    pub snapshot_id: SnapshotId,
    pub job_id: String,
    /// Provider file id of the uploaded export
    pub export_ref: String,
    pub version: String,
    pub example_count: i64,
}

/// Validate request fields
pub fn validate_request(req: &CreateSnapshotRequest) -> Result<()> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("Snapshot name cannot be empty".to_string()));
    }
    if name.chars().count() > MAX_SNAPSHOT_NAME_LEN {
        return Err(AppError::Validation(format!(
            "Snapshot name too long (max {} chars)",
            MAX_SNAPSHOT_NAME_LEN
        )));
    }
    if req.requested_by.trim().is_empty() {
        return Err(AppError::Validation("requested_by cannot be empty".to_string()));
    }
    req.filter_spec
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))
}

/// Staleness gate.
///
/// Returns the id of a fresh same-hash snapshot that the new one will
/// supersede, `None` if the hash is new.
///
/// # Errors
/// - `AppError::DuplicateSnapshot` if a same-hash snapshot exists and no
///   training data changed after the most recent snapshot was created
async fn check_staleness(
    tx: &mut dyn SnapshotRepositoryTransaction,
    filter_hash: &str,
    latest_mutation_at: Option<i64>,
) -> Result<Option<SnapshotId>> {
    let Some(existing) = tx.find_fresh_by_hash(filter_hash).await? else {
        return Ok(None);
    };

    let latest_created_at = tx
        .find_latest()
        .await?
        .map(|s| s.created_at)
        .unwrap_or(existing.created_at);

    let mutated_since = latest_mutation_at.is_some_and(|m| m > latest_created_at);
    if mutated_since {
        Ok(Some(existing.id))
    } else {
        Err(AppError::DuplicateSnapshot {
            snapshot_id: existing.id,
        })
    }
}

pub struct SnapshotBuilder {
    snapshot_repo: Arc<dyn TransactionalSnapshotRepository>,
    data_source: Arc<dyn TrainingDataSource>,
    lock_manager: Arc<LockManager>,
    submitter: Arc<JobSubmitter>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
    settings: LifecycleSettings,
}

impl SnapshotBuilder {
    pub fn new(
        snapshot_repo: Arc<dyn TransactionalSnapshotRepository>,
        data_source: Arc<dyn TrainingDataSource>,
        lock_manager: Arc<LockManager>,
        submitter: Arc<JobSubmitter>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            snapshot_repo,
            data_source,
            lock_manager,
            submitter,
            id_provider,
            time_provider,
            settings,
        }
    }

    /// Create a snapshot and submit its training job
    ///
    /// Algorithm:
    /// 1. Validate and hash the filter
    /// 2. Staleness gate (fast fail before exporting)
    /// 3. Export and enforce the minimum example count
    /// 4. Re-run the gate, supersede stale same-hash snapshots and insert, in
    ///    one transaction (the partial unique index catches a racing creator)
    /// 5. Take the export lock and submit
    pub async fn create(&self, req: CreateSnapshotRequest) -> Result<CreatedSnapshot> {
        validate_request(&req)?;
        let filter_hash = req.filter_spec.filter_hash()?;
        let latest_mutation_at = self.data_source.latest_mutation_at().await?;

        {
            let mut tx = self.snapshot_repo.begin_transaction().await?;
            let gate = check_staleness(tx.as_mut(), &filter_hash, latest_mutation_at).await;
            tx.rollback().await?;
            gate?;
        }

        let payload = self.data_source.export(&req.filter_spec).await?;
        if payload.example_count < self.settings.min_examples {
            return Err(AppError::Validation(format!(
                "Not enough training examples: {} (minimum {})",
                payload.example_count, self.settings.min_examples
            )));
        }

        let now = self.time_provider.now_millis();
        let mut snapshot = Snapshot::new(
            self.id_provider.generate_id(),
            now,
            req.name.trim(),
            req.filter_spec,
            &filter_hash,
            req.requested_by,
            self.settings.max_retries,
        );
        snapshot.example_count = Some(payload.example_count);

        let mut tx = self.snapshot_repo.begin_transaction().await?;
        let superseded =
            match check_staleness(tx.as_mut(), &filter_hash, latest_mutation_at).await {
                Ok(superseded) => superseded,
                Err(e) => {
                    tx.rollback().await?;
                    return Err(e);
                }
            };
        if superseded.is_some() {
            tx.mark_stale(&filter_hash, &snapshot.id).await?;
        }
        tx.insert(&snapshot).await?;
        tx.commit().await?;

        info!(
            snapshot_id = %snapshot.id,
            filter_hash = %filter_hash,
            version = %snapshot.version,
            examples = payload.example_count,
            superseded = ?superseded,
            "Snapshot created"
        );

        self.lock_manager
            .acquire(&snapshot.id, LockContext::Export)
            .await?;

        let job = self
            .submitter
            .submit(&mut snapshot, payload, SubmissionContext::initial())
            .await?;

        Ok(CreatedSnapshot {
            snapshot_id: snapshot.id,
            job_id: job.id,
            export_ref: snapshot.file_id.unwrap_or_default(),
            version: snapshot.version,
            example_count: snapshot.example_count.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(name: &str) -> CreateSnapshotRequest {
        CreateSnapshotRequest {
            filter_spec: FilterSpec::default(),
            name: name.to_string(),
            requested_by: "therapist-7".to_string(),
        }
    }

    #[test]
    fn test_validate_name_empty() {
        let err = validate_request(&request("   ")).unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_validate_name_too_long() {
        let err = validate_request(&request(&"a".repeat(201))).unwrap_err();
        assert!(err.to_string().contains("too long"));
    }

    #[test]
    fn test_validate_malformed_filter() {
        let mut req = request("weekly");
        req.filter_spec.min_rating = Some(0);
        assert!(matches!(
            validate_request(&req),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_valid_request() {
        assert!(validate_request(&request("weekly export")).is_ok());
    }
}
