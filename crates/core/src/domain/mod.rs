// Domain Layer - Pure business logic and entities

pub mod error;
pub mod filter;
pub mod job_event;
pub mod lock;
pub mod snapshot;

// Re-exports
pub use error::DomainError;
pub use filter::{FilterHash, FilterSpec};
pub use job_event::{JobEvent, RetryOrigin};
pub use lock::{Lock, LockContext};
pub use snapshot::{version_label, JobId, JobStatus, Snapshot, SnapshotId};
