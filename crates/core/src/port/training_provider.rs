// Training Provider Port (external model-training service)

use crate::domain::{DomainError, JobId, JobStatus};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Provider job as seen through this port; shape validated by the adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderJob {
    pub id: JobId,
    pub status: JobStatus,
    /// Base model while training, fine-tuned model once succeeded
    pub model: Option<String>,
    pub error: Option<String>,
}

/// Map the provider's status vocabulary onto ours
pub fn normalize_provider_status(raw: &str) -> std::result::Result<JobStatus, DomainError> {
    match raw {
        "pending" => Ok(JobStatus::Pending),
        "uploading" => Ok(JobStatus::Uploading),
        "validating_files" => Ok(JobStatus::ValidatingFiles),
        "queued" => Ok(JobStatus::Queued),
        "running" => Ok(JobStatus::Running),
        "succeeded" => Ok(JobStatus::Succeeded),
        "failed" | "cancelled" => Ok(JobStatus::Failed),
        other => Err(DomainError::UnknownStatus(other.to_string())),
    }
}

/// Training provider interface
///
/// Errors are reported as `AppError::ExternalService` so callers can retry them.
#[async_trait]
pub trait TrainingProvider: Send + Sync {
    /// Upload a training file, returning the provider's file id
    async fn upload_file(&self, bytes: Vec<u8>, filename: &str) -> Result<String>;

    /// Create a fine-tuning job over an uploaded file
    async fn create_job(&self, file_id: &str, model_hint: &str) -> Result<ProviderJob>;

    /// Fetch the current state of a job
    async fn get_job(&self, job_id: &JobId) -> Result<ProviderJob>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct ProviderState {
        jobs: HashMap<String, ProviderJob>,
        job_order: Vec<String>,
        next_id: u64,
        initial_status: Option<JobStatus>,
        upload_failures: u32,
        credential_failures: u32,
        create_failures: u32,
        get_failures: HashMap<String, u32>,
        uploads: usize,
        creates: usize,
    }

    /// Scripted provider: jobs start in `validating_files` (or the status set
    /// with `set_initial_status`) and move only when the test calls `set_status`
    #[derive(Default)]
    pub struct MockTrainingProvider {
        state: Mutex<ProviderState>,
    }

    impl MockTrainingProvider {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_status(&self, job_id: &str, status: JobStatus) {
            self.set_status_with_error(job_id, status, None);
        }

        pub fn set_status_with_error(&self, job_id: &str, status: JobStatus, error: Option<&str>) {
            let mut state = self.state.lock().unwrap();
            if let Some(job) = state.jobs.get_mut(job_id) {
                job.status = status;
                job.error = error.map(str::to_string);
                if status == JobStatus::Succeeded {
                    job.model = Some(format!("ft:{}", job_id));
                }
            }
        }

        /// Status reported by jobs created from now on
        pub fn set_initial_status(&self, status: JobStatus) {
            self.state.lock().unwrap().initial_status = Some(status);
        }

        /// Make the next `n` uploads fail
        pub fn fail_next_uploads(&self, n: u32) {
            self.state.lock().unwrap().upload_failures = n;
        }

        /// Make the next `n` uploads fail with rejected credentials
        pub fn reject_next_uploads_credentials(&self, n: u32) {
            self.state.lock().unwrap().credential_failures = n;
        }

        /// Make the next `n` job creations fail
        pub fn fail_next_creates(&self, n: u32) {
            self.state.lock().unwrap().create_failures = n;
        }

        /// Make the next `n` status lookups for `job_id` fail
        pub fn fail_next_gets(&self, job_id: &str, n: u32) {
            self.state
                .lock()
                .unwrap()
                .get_failures
                .insert(job_id.to_string(), n);
        }

        pub fn upload_count(&self) -> usize {
            self.state.lock().unwrap().uploads
        }

        pub fn create_count(&self) -> usize {
            self.state.lock().unwrap().creates
        }

        /// Job ids in creation order
        pub fn job_ids(&self) -> Vec<String> {
            self.state.lock().unwrap().job_order.clone()
        }
    }

    #[async_trait]
    impl TrainingProvider for MockTrainingProvider {
        async fn upload_file(&self, bytes: Vec<u8>, _filename: &str) -> Result<String> {
            let mut state = self.state.lock().unwrap();
            state.uploads += 1;
            if state.credential_failures > 0 {
                state.credential_failures -= 1;
                return Err(AppError::Config(
                    "upload rejected credentials (401 Unauthorized)".to_string(),
                ));
            }
            if state.upload_failures > 0 {
                state.upload_failures -= 1;
                return Err(AppError::ExternalService("upload rejected".to_string()));
            }
            Ok(format!("file-{}-{}", state.uploads, bytes.len()))
        }

        async fn create_job(&self, _file_id: &str, model_hint: &str) -> Result<ProviderJob> {
            let mut state = self.state.lock().unwrap();
            state.creates += 1;
            if state.create_failures > 0 {
                state.create_failures -= 1;
                return Err(AppError::ExternalService("job creation rejected".to_string()));
            }
            state.next_id += 1;
            let job = ProviderJob {
                id: format!("ftjob-{}", state.next_id),
                status: state.initial_status.unwrap_or(JobStatus::ValidatingFiles),
                model: Some(model_hint.to_string()),
                error: None,
            };
            state.jobs.insert(job.id.clone(), job.clone());
            state.job_order.push(job.id.clone());
            Ok(job)
        }

        async fn get_job(&self, job_id: &JobId) -> Result<ProviderJob> {
            let mut state = self.state.lock().unwrap();
            if let Some(remaining) = state.get_failures.get_mut(job_id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(AppError::ExternalService(format!(
                        "provider unavailable for {}",
                        job_id
                    )));
                }
            }
            state
                .jobs
                .get(job_id)
                .cloned()
                .ok_or_else(|| AppError::ExternalService(format!("unknown job {}", job_id)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_provider_status() {
        assert_eq!(
            normalize_provider_status("validating_files").unwrap(),
            JobStatus::ValidatingFiles
        );
        assert_eq!(normalize_provider_status("cancelled").unwrap(), JobStatus::Failed);
        assert!(normalize_provider_status("paused").is_err());
    }
}
