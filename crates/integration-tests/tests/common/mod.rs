//! Shared wiring for the integration tests
//!
//! Real SQLite adapters on a temp-file database, scripted provider, fixed
//! data source and a manual clock.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use tunekeeper_core::application::{
    CreateSnapshotRequest, CreatedSnapshot, JobSubmitter, LifecycleSettings, LockManager,
    RetryOrchestrator, SnapshotBuilder, StatusPoller,
};
use tunekeeper_core::domain::{FilterSpec, Snapshot};
use tunekeeper_core::error::Result;
use tunekeeper_core::port::data_source::mocks::FixedDataSource;
use tunekeeper_core::port::id_provider::mocks::SequentialIdProvider;
use tunekeeper_core::port::notifier::mocks::RecordingNotifier;
use tunekeeper_core::port::time_provider::mocks::ManualClock;
use tunekeeper_core::port::training_provider::mocks::MockTrainingProvider;
use tunekeeper_core::port::{SnapshotRepository, TimeProvider};
use tunekeeper_infra_sqlite::{
    create_pool, run_migrations, SqliteJobEventRepository, SqliteLockRepository,
    SqliteSnapshotRepository,
};

/// 2023-11-14T22:13:20Z
pub const START_MILLIS: i64 = 1_700_000_000_000;
pub const EXAMPLES: i64 = 50;

pub struct Harness {
    pub db_path: PathBuf,
    pub clock: Arc<ManualClock>,
    pub provider: Arc<MockTrainingProvider>,
    pub data: Arc<FixedDataSource>,
    pub notifier: Arc<RecordingNotifier>,
    pub snapshots: Arc<SqliteSnapshotRepository>,
    pub events: Arc<SqliteJobEventRepository>,
    pub lock_repo: Arc<SqliteLockRepository>,
    pub locks: Arc<LockManager>,
    pub builder: Arc<SnapshotBuilder>,
    pub retry: Arc<RetryOrchestrator>,
    pub poller: Arc<StatusPoller>,
    pub settings: LifecycleSettings,
}

/// Default lifecycle settings with a 1ms provider backoff
pub fn test_settings() -> LifecycleSettings {
    LifecycleSettings {
        provider_base_delay_ms: 1,
        ..Default::default()
    }
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_settings(test_settings()).await
    }

    pub async fn with_settings(settings: LifecycleSettings) -> Self {
        let db_path = std::env::temp_dir().join(format!("tk-it-{}.db", uuid::Uuid::new_v4()));
        let pool = create_pool(db_path.to_str().unwrap()).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let clock = Arc::new(ManualClock::new(START_MILLIS));
        let ids = Arc::new(SequentialIdProvider::new("snap"));
        let provider = Arc::new(MockTrainingProvider::new());
        let data = Arc::new(FixedDataSource::new(EXAMPLES));
        let notifier = Arc::new(RecordingNotifier::new());

        let snapshots = Arc::new(SqliteSnapshotRepository::new(pool.clone()));
        let events = Arc::new(SqliteJobEventRepository::new(pool.clone()));
        let lock_repo = Arc::new(SqliteLockRepository::new(pool.clone()));

        let locks = Arc::new(LockManager::new(
            lock_repo.clone(),
            Arc::new(SequentialIdProvider::new("holder")),
            clock.clone(),
            settings.lock_ttl_ms,
        ));
        let submitter = Arc::new(JobSubmitter::new(
            snapshots.clone(),
            events.clone(),
            provider.clone(),
            clock.clone(),
            settings.clone(),
        ));
        let builder = Arc::new(SnapshotBuilder::new(
            snapshots.clone(),
            data.clone(),
            locks.clone(),
            submitter.clone(),
            ids,
            clock.clone(),
            settings.clone(),
        ));
        let retry = Arc::new(RetryOrchestrator::new(
            snapshots.clone(),
            events.clone(),
            locks.clone(),
            data.clone(),
            submitter,
            clock.clone(),
            settings.clone(),
        ));
        let poller = Arc::new(StatusPoller::new(
            snapshots.clone(),
            events.clone(),
            provider.clone(),
            notifier.clone(),
            retry.clone(),
            clock.clone(),
            settings.clone(),
        ));

        Self {
            db_path,
            clock,
            provider,
            data,
            notifier,
            snapshots,
            events,
            lock_repo,
            locks,
            builder,
            retry,
            poller,
            settings,
        }
    }

    pub fn now(&self) -> i64 {
        self.clock.now_millis()
    }

    pub async fn create(&self, name: &str, tags: &[&str]) -> Result<CreatedSnapshot> {
        self.builder
            .create(CreateSnapshotRequest {
                filter_spec: filter(tags),
                name: name.to_string(),
                requested_by: "alice".to_string(),
            })
            .await
    }

    pub async fn snapshot(&self, id: &str) -> Snapshot {
        self.snapshots
            .find_by_id(&id.to_string())
            .await
            .unwrap()
            .expect("snapshot exists")
    }

    /// Current provider job of a snapshot
    pub async fn job_of(&self, id: &str) -> String {
        self.snapshot(id).await.job_id.expect("snapshot has a job")
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut path = self.db_path.clone().into_os_string();
            path.push(suffix);
            let _ = std::fs::remove_file(path);
        }
    }
}

pub fn filter(tags: &[&str]) -> FilterSpec {
    FilterSpec {
        tags: tags.iter().map(|t| t.to_string()).collect(),
        annotated_only: true,
        ..Default::default()
    }
}
