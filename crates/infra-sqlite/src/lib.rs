// Tunekeeper Infrastructure - SQLite Adapter
// Implements: SnapshotRepository, TransactionalSnapshotRepository, LockRepository, JobEventRepository

mod connection;
mod error;
mod job_event_repository;
mod lock_repository;
mod migration;
mod snapshot_repository;
mod transaction;

pub use connection::create_pool;
pub use job_event_repository::SqliteJobEventRepository;
pub use lock_repository::SqliteLockRepository;
pub use migration::{current_version, run_migrations};
pub use snapshot_repository::SqliteSnapshotRepository;
pub use transaction::SqliteSnapshotTransaction;

// Note: sqlx::Error conversion goes through error::map_sqlx_error
// (orphan rules: no From<sqlx::Error> for AppError here)
