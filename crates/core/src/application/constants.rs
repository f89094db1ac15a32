// Lifecycle constants (No magic values)
use std::time::Duration;

/// Maximum retry attempts per snapshot
pub const MAX_RETRIES: i32 = 3;

/// TTL of export/retry locks (10 minutes)
pub const LOCK_TTL_MS: i64 = 10 * 60 * 1000;

/// Minimum gap between automatic retries of one snapshot (5 minutes)
pub const RETRY_COOLDOWN_MS: i64 = 5 * 60 * 1000;

/// Exports smaller than this are rejected
pub const MIN_TRAINING_EXAMPLES: i64 = 10;

/// Attempts per provider call (poll, upload, create)
pub const PROVIDER_MAX_ATTEMPTS: u32 = 3;

/// Base delay of the provider backoff: delay = attempt * base (1s)
pub const PROVIDER_BASE_DELAY: Duration = Duration::from_secs(1);

/// Model hint passed to the provider on job creation
pub const DEFAULT_BASE_MODEL: &str = "gpt-4o-mini-2024-07-18";

/// Longest accepted snapshot display name
pub const MAX_SNAPSHOT_NAME_LEN: usize = 200;

/// Default interval of the built-in poll timer (60s)
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);
