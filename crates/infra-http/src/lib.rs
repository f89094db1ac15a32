// Tunekeeper Infrastructure - HTTP Adapters
// Implements: TrainingProvider, TrainingDataSource, Notifier

mod error;
mod exporter;
mod notifier;
mod provider;

pub use exporter::HttpDataSource;
pub use notifier::{LogNotifier, WebhookNotifier};
pub use provider::OpenAiTrainingProvider;

use std::time::Duration;
use tunekeeper_core::error::{AppError, Result};

/// Per-request timeout shared by every adapter
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Build the shared reqwest client
pub fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("tunekeeper/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| AppError::Config(format!("Failed to create HTTP client: {}", e)))
}

/// Join a base URL and a path without doubling slashes
pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_cleanly() {
        assert_eq!(
            endpoint("https://api.example.com/v1/", "/files"),
            "https://api.example.com/v1/files"
        );
        assert_eq!(
            endpoint("http://localhost:8080", "exports"),
            "http://localhost:8080/exports"
        );
    }
}
