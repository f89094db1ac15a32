// Central Error Type for the Application

use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// A fresh snapshot with the same filter already exists
    #[error("Duplicate snapshot: {snapshot_id} already exports this filter and no data changed since")]
    DuplicateSnapshot { snapshot_id: String },

    #[error("Conflict: retry already in progress for snapshot {snapshot_id} (lock expires at {expires_at})")]
    LockHeld { snapshot_id: String, expires_at: i64 },

    #[error("Conflict: cooldown active for snapshot {snapshot_id}, retry in {retry_after_ms}ms")]
    CooldownActive {
        snapshot_id: String,
        retry_after_ms: i64,
    },

    #[error("Retry budget exceeded for snapshot {snapshot_id} ({retry_count}/{max_retries})")]
    RetryBudgetExceeded {
        snapshot_id: String,
        retry_count: i32,
        max_retries: i32,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Transient failures worth another attempt (provider/network hiccups)
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::ExternalService(_))
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

// Note: sqlx::Error and reqwest::Error conversions live in the infra crates
// (orphan rules), each mapping into the variants above
