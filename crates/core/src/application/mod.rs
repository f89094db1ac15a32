// Application Layer - Use Cases and Business Logic

pub mod backoff;
pub mod constants;
pub mod job_submitter;
pub mod lock_manager;
pub mod poll_scheduler;
pub mod retry;
pub mod settings;
pub mod shutdown;
pub mod snapshot_builder;
pub mod status_poller;

// Re-exports
pub use backoff::retry_with_backoff;
pub use job_submitter::{JobSubmitter, SubmissionContext};
pub use lock_manager::LockManager;
pub use poll_scheduler::PollScheduler;
pub use retry::{RetryOrchestrator, RetryOutcome, RetryRequest};
pub use settings::LifecycleSettings;
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
pub use snapshot_builder::{CreateSnapshotRequest, CreatedSnapshot, SnapshotBuilder};
pub use status_poller::{PollReport, StatusPoller};
