// reqwest -> AppError mapping shared by the HTTP adapters

use reqwest::{Response, StatusCode};
use tunekeeper_core::error::{AppError, Result};

/// Transport failures (connect, timeout, body) are external and retryable
pub(crate) fn map_reqwest_error(context: &str, err: reqwest::Error) -> AppError {
    let kind = if err.is_timeout() {
        "timeout"
    } else if err.is_connect() {
        "connection failed"
    } else if err.is_decode() {
        "invalid response body"
    } else {
        "request failed"
    };
    AppError::ExternalService(format!("{} {}: {}", context, kind, err))
}

/// Turn a non-2xx response into an error carrying the status and body
///
/// 401/403 are configuration problems and are not retried; everything else
/// (429, 5xx, unexpected 4xx) stays `ExternalService`.
pub(crate) async fn check_status(context: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(status_error(context, status, &body))
}

pub(crate) fn status_error(context: &str, status: StatusCode, body: &str) -> AppError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            AppError::Config(format!("{} rejected credentials ({})", context, status))
        }
        StatusCode::TOO_MANY_REQUESTS => {
            AppError::ExternalService(format!("{} rate limited: {}", context, body))
        }
        _ => AppError::ExternalService(format!("{} returned {}: {}", context, status, body)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_failures_are_not_transient() {
        let err = status_error("upload", StatusCode::UNAUTHORIZED, "");
        assert!(matches!(err, AppError::Config(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_server_errors_are_transient() {
        let err = status_error("get_job", StatusCode::BAD_GATEWAY, "upstream");
        assert!(err.is_transient());
        assert!(err.to_string().contains("502"));

        let throttled = status_error("get_job", StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert!(throttled.is_transient());
    }
}
