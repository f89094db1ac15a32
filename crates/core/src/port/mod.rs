// Port Layer - Interfaces for external dependencies

pub mod data_source;
pub mod id_provider; // For deterministic testing
pub mod job_event_repository;
pub mod lock_repository;
pub mod notifier;
pub mod snapshot_repository;
pub mod time_provider;
pub mod training_provider;
pub mod transaction;

// Re-exports
pub use data_source::{ExportPayload, TrainingDataSource};
pub use id_provider::IdProvider;
pub use job_event_repository::JobEventRepository;
pub use lock_repository::{LockAcquisition, LockRepository};
pub use notifier::{Notification, Notifier, Outcome};
pub use snapshot_repository::{SnapshotRepository, StatusUpdate};
pub use time_provider::TimeProvider;
pub use training_provider::{normalize_provider_status, ProviderJob, TrainingProvider};
pub use transaction::{
    SnapshotRepositoryTransaction, Transaction, TransactionalSnapshotRepository,
};
