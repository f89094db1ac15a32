//! RPC Error Types
//!
//! Maps application errors to JSON-RPC error codes. Each code is the HTTP
//! status it stands for, times ten.

use jsonrpsee::types::ErrorObjectOwned;
use serde_json::json;
use tunekeeper_core::error::AppError;

/// RPC Error Codes
pub mod code {
    pub const VALIDATION_ERROR: i32 = 4000;
    pub const NOT_FOUND: i32 = 4040;
    pub const CONFLICT: i32 = 4090;
    pub const LOCKED: i32 = 4230;
    pub const THROTTLED: i32 = 4290;
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const DB_ERROR: i32 = 5010;
    pub const EXTERNAL_SERVICE: i32 = 5030;

    /// HTTP status equivalent of an RPC code
    pub fn http_status(code: i32) -> u16 {
        (code / 10) as u16
    }
}

/// Convert AppError to JSON-RPC ErrorObject
pub fn to_rpc_error(err: AppError) -> ErrorObjectOwned {
    let message = err.to_string();
    match err {
        AppError::Validation(_) | AppError::Serialization(_) => {
            ErrorObjectOwned::owned(code::VALIDATION_ERROR, message, None::<()>)
        }
        AppError::NotFound(_) => ErrorObjectOwned::owned(code::NOT_FOUND, message, None::<()>),
        // State machine refusals are conflicts with the stored state
        AppError::Conflict(_) | AppError::Domain(_) => {
            ErrorObjectOwned::owned(code::CONFLICT, message, None::<()>)
        }
        AppError::LockHeld {
            snapshot_id,
            expires_at,
        } => ErrorObjectOwned::owned(
            code::CONFLICT,
            message,
            Some(json!({ "snapshot_id": snapshot_id, "expires_at": expires_at })),
        ),
        AppError::DuplicateSnapshot { snapshot_id } => ErrorObjectOwned::owned(
            code::LOCKED,
            message,
            Some(json!({ "snapshot_id": snapshot_id })),
        ),
        AppError::CooldownActive {
            snapshot_id,
            retry_after_ms,
        } => ErrorObjectOwned::owned(
            code::THROTTLED,
            message,
            Some(json!({ "snapshot_id": snapshot_id, "retry_after_ms": retry_after_ms })),
        ),
        AppError::RetryBudgetExceeded {
            snapshot_id,
            retry_count,
            max_retries,
        } => ErrorObjectOwned::owned(
            code::THROTTLED,
            message,
            Some(json!({
                "snapshot_id": snapshot_id,
                "retry_count": retry_count,
                "max_retries": max_retries,
            })),
        ),
        AppError::ExternalService(_) => {
            ErrorObjectOwned::owned(code::EXTERNAL_SERVICE, message, None::<()>)
        }
        AppError::Database(_) => ErrorObjectOwned::owned(code::DB_ERROR, message, None::<()>),
        AppError::Config(_) | AppError::Internal(_) => {
            ErrorObjectOwned::owned(code::INTERNAL_ERROR, message, None::<()>)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_encode_http_status() {
        assert_eq!(code::http_status(code::NOT_FOUND), 404);
        assert_eq!(code::http_status(code::LOCKED), 423);
        assert_eq!(code::http_status(code::THROTTLED), 429);
        assert_eq!(code::http_status(code::EXTERNAL_SERVICE), 503);
    }

    #[test]
    fn test_cooldown_carries_retry_after() {
        let err = to_rpc_error(AppError::CooldownActive {
            snapshot_id: "snap-1".to_string(),
            retry_after_ms: 120_000,
        });
        assert_eq!(err.code(), code::THROTTLED);
        let data: serde_json::Value = serde_json::from_str(err.data().unwrap().get()).unwrap();
        assert_eq!(data["retry_after_ms"], 120_000);
    }

    #[test]
    fn test_lock_held_is_conflict_with_expiry() {
        let err = to_rpc_error(AppError::LockHeld {
            snapshot_id: "snap-1".to_string(),
            expires_at: 42,
        });
        assert_eq!(err.code(), code::CONFLICT);
        assert!(err.message().contains("retry already in progress"));
    }

    #[test]
    fn test_duplicate_snapshot_is_locked() {
        let err = to_rpc_error(AppError::DuplicateSnapshot {
            snapshot_id: "snap-1".to_string(),
        });
        assert_eq!(err.code(), code::LOCKED);
    }

    #[test]
    fn test_budget_and_external_codes() {
        let budget = to_rpc_error(AppError::RetryBudgetExceeded {
            snapshot_id: "snap-1".to_string(),
            retry_count: 3,
            max_retries: 3,
        });
        assert_eq!(budget.code(), code::THROTTLED);

        let external = to_rpc_error(AppError::ExternalService("down".to_string()));
        assert_eq!(external.code(), code::EXTERNAL_SERVICE);
        assert_eq!(to_rpc_error(AppError::Database("x".into())).code(), code::DB_ERROR);
    }
}
