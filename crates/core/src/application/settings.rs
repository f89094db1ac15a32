// Lifecycle settings shared by the application services

use super::constants::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for snapshot creation, locking, polling and retries
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleSettings {
    pub max_retries: i32,
    pub lock_ttl_ms: i64,
    pub retry_cooldown_ms: i64,
    pub min_examples: i64,
    pub provider_max_attempts: u32,
    pub provider_base_delay_ms: u64,
    pub base_model: String,
    /// Poller hands failed jobs to the retry orchestrator
    pub auto_retry: bool,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            lock_ttl_ms: LOCK_TTL_MS,
            retry_cooldown_ms: RETRY_COOLDOWN_MS,
            min_examples: MIN_TRAINING_EXAMPLES,
            provider_max_attempts: PROVIDER_MAX_ATTEMPTS,
            provider_base_delay_ms: PROVIDER_BASE_DELAY.as_millis() as u64,
            base_model: DEFAULT_BASE_MODEL.to_string(),
            auto_retry: true,
        }
    }
}

impl LifecycleSettings {
    pub fn provider_base_delay(&self) -> Duration {
        Duration::from_millis(self.provider_base_delay_ms)
    }
}
