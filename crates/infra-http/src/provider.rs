// OpenAI-compatible fine-tuning provider

use crate::endpoint;
use crate::error::{check_status, map_reqwest_error};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use tunekeeper_core::domain::JobId;
use tunekeeper_core::error::{AppError, Result};
use tunekeeper_core::port::{normalize_provider_status, ProviderJob, TrainingProvider};

const FILE_PURPOSE: &str = "fine-tune";
const JSONL_MIME: &str = "application/jsonl";

/// Fine-tuning API client (`/files`, `/fine_tuning/jobs`)
pub struct OpenAiTrainingProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl OpenAiTrainingProvider {
    pub fn new(client: Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct CreateJobRequest<'a> {
    training_file: &'a str,
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct FileObject {
    id: String,
}

/// Job object as returned by the provider; validated before it leaves the adapter
#[derive(Debug, Deserialize)]
pub(crate) struct JobObject {
    id: String,
    status: String,
    model: Option<String>,
    fine_tuned_model: Option<String>,
    error: Option<JobError>,
}

#[derive(Debug, Deserialize)]
struct JobError {
    message: Option<String>,
    code: Option<String>,
}

impl JobObject {
    pub(crate) fn into_provider_job(self) -> Result<ProviderJob> {
        if self.id.trim().is_empty() {
            return Err(AppError::ExternalService(
                "provider returned a job without an id".to_string(),
            ));
        }
        let status = normalize_provider_status(&self.status).map_err(|e| {
            AppError::ExternalService(format!("job {}: {}", self.id, e))
        })?;

        let error = self.error.and_then(|e| match (e.code, e.message) {
            (Some(code), Some(message)) => Some(format!("{}: {}", code, message)),
            (None, Some(message)) => Some(message),
            (Some(code), None) => Some(code),
            (None, None) => None,
        });

        Ok(ProviderJob {
            id: self.id,
            status,
            model: self.fine_tuned_model.or(self.model),
            error,
        })
    }
}

#[async_trait]
impl TrainingProvider for OpenAiTrainingProvider {
    async fn upload_file(&self, bytes: Vec<u8>, filename: &str) -> Result<String> {
        let size = bytes.len();
        let file = Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(JSONL_MIME)
            .map_err(|e| AppError::Internal(format!("invalid upload mime type: {}", e)))?;
        let form = Form::new().text("purpose", FILE_PURPOSE).part("file", file);

        let response = self
            .client
            .post(endpoint(&self.base_url, "files"))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| map_reqwest_error("upload_file", e))?;
        let response = check_status("upload_file", response).await?;

        let file: FileObject = response
            .json()
            .await
            .map_err(|e| map_reqwest_error("upload_file", e))?;

        debug!(file_id = %file.id, bytes = size, "Training file uploaded");
        Ok(file.id)
    }

    async fn create_job(&self, file_id: &str, model_hint: &str) -> Result<ProviderJob> {
        let response = self
            .client
            .post(endpoint(&self.base_url, "fine_tuning/jobs"))
            .bearer_auth(&self.api_key)
            .json(&CreateJobRequest {
                training_file: file_id,
                model: model_hint,
            })
            .send()
            .await
            .map_err(|e| map_reqwest_error("create_job", e))?;
        let response = check_status("create_job", response).await?;

        let job: JobObject = response
            .json()
            .await
            .map_err(|e| map_reqwest_error("create_job", e))?;
        job.into_provider_job()
    }

    async fn get_job(&self, job_id: &JobId) -> Result<ProviderJob> {
        let response = self
            .client
            .get(endpoint(&self.base_url, &format!("fine_tuning/jobs/{}", job_id)))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| map_reqwest_error("get_job", e))?;
        let response = check_status("get_job", response).await?;

        let job: JobObject = response
            .json()
            .await
            .map_err(|e| map_reqwest_error("get_job", e))?;
        job.into_provider_job()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build_client;
    use std::time::Duration;
    use tunekeeper_core::domain::JobStatus;

    fn parse(json: &str) -> Result<ProviderJob> {
        serde_json::from_str::<JobObject>(json)
            .unwrap()
            .into_provider_job()
    }

    #[test]
    fn test_succeeded_job_reports_fine_tuned_model() {
        let job = parse(
            r#"{"id":"ftjob-abc","object":"fine_tuning.job","status":"succeeded",
                "model":"gpt-4o-mini-2024-07-18","fine_tuned_model":"ft:gpt-4o-mini:org::xyz",
                "error":null}"#,
        )
        .unwrap();
        assert_eq!(job.status, JobStatus::Succeeded);
        assert_eq!(job.model.as_deref(), Some("ft:gpt-4o-mini:org::xyz"));
        assert!(job.error.is_none());
    }

    #[test]
    fn test_cancelled_job_is_failed_with_error_text() {
        let job = parse(
            r#"{"id":"ftjob-abc","status":"cancelled","model":"base",
                "fine_tuned_model":null,
                "error":{"code":"invalid_training_file","message":"line 3 is not JSON"}}"#,
        )
        .unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(
            job.error.as_deref(),
            Some("invalid_training_file: line 3 is not JSON")
        );
    }

    #[test]
    fn test_unknown_status_is_rejected_at_the_boundary() {
        let err = parse(r#"{"id":"ftjob-abc","status":"paused"}"#).unwrap_err();
        assert!(matches!(err, AppError::ExternalService(_)));
        assert!(err.to_string().contains("paused"));
    }

    #[test]
    fn test_blank_id_is_rejected() {
        assert!(parse(r#"{"id":" ","status":"queued"}"#).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_transient() {
        let client = build_client(Duration::from_millis(500)).unwrap();
        let provider = OpenAiTrainingProvider::new(client, "http://127.0.0.1:9", "sk-test");

        let err = provider.get_job(&"ftjob-1".to_string()).await.unwrap_err();
        assert!(err.is_transient(), "got {:?}", err);
    }
}
