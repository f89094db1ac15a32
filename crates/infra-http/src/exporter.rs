// HTTP export service client (training data source)

use crate::endpoint;
use crate::error::{check_status, map_reqwest_error};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use tunekeeper_core::domain::FilterSpec;
use tunekeeper_core::error::{AppError, Result};
use tunekeeper_core::port::{ExportPayload, TrainingDataSource};

const DEFAULT_EXPORT_FILENAME: &str = "training.jsonl";

/// Talks to the annotation store's export endpoints:
/// - `POST {base}/exports` with `{"filter": FilterSpec}`
/// - `GET {base}/mutations/latest`
pub struct HttpDataSource {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpDataSource {
    pub fn new(client: Client, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key,
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

#[derive(Debug, Serialize)]
struct ExportRequest<'a> {
    filter: &'a FilterSpec,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ExportResponse {
    example_count: i64,
    filename: Option<String>,
    /// JSONL body, one training example per line
    jsonl: String,
}

#[derive(Debug, Deserialize)]
struct LatestMutationResponse {
    latest_mutation_at: Option<i64>,
}

impl ExportResponse {
    pub(crate) fn into_payload(self) -> Result<ExportPayload> {
        if self.example_count < 0 {
            return Err(AppError::ExternalService(format!(
                "export reported a negative example count ({})",
                self.example_count
            )));
        }
        let lines = self.jsonl.lines().filter(|l| !l.trim().is_empty()).count() as i64;
        if lines != self.example_count {
            return Err(AppError::ExternalService(format!(
                "export claims {} examples but contains {} lines",
                self.example_count, lines
            )));
        }

        Ok(ExportPayload {
            bytes: self.jsonl.into_bytes(),
            example_count: self.example_count,
            filename: self
                .filename
                .unwrap_or_else(|| DEFAULT_EXPORT_FILENAME.to_string()),
        })
    }
}

#[async_trait]
impl TrainingDataSource for HttpDataSource {
    async fn export(&self, filter: &FilterSpec) -> Result<ExportPayload> {
        let request = self
            .client
            .post(endpoint(&self.base_url, "exports"))
            .json(&ExportRequest { filter });
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| map_reqwest_error("export", e))?;
        let response = check_status("export", response).await?;

        let export: ExportResponse = response
            .json()
            .await
            .map_err(|e| map_reqwest_error("export", e))?;
        let payload = export.into_payload()?;

        debug!(
            examples = payload.example_count,
            bytes = payload.bytes.len(),
            "Export received"
        );
        Ok(payload)
    }

    async fn latest_mutation_at(&self) -> Result<Option<i64>> {
        let request = self.client.get(endpoint(&self.base_url, "mutations/latest"));
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| map_reqwest_error("latest_mutation_at", e))?;
        let response = check_status("latest_mutation_at", response).await?;

        let body: LatestMutationResponse = response
            .json()
            .await
            .map_err(|e| map_reqwest_error("latest_mutation_at", e))?;
        Ok(body.latest_mutation_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(json: &str) -> ExportResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_payload_defaults_filename() {
        let payload = response(r#"{"example_count":2,"jsonl":"{\"a\":1}\n{\"a\":2}\n"}"#)
            .into_payload()
            .unwrap();
        assert_eq!(payload.example_count, 2);
        assert_eq!(payload.filename, "training.jsonl");
        assert!(payload.bytes.ends_with(b"\n"));
    }

    #[test]
    fn test_count_mismatch_is_rejected() {
        let err = response(r#"{"example_count":5,"jsonl":"{}\n"}"#)
            .into_payload()
            .unwrap_err();
        assert!(err.to_string().contains("claims 5"));
    }

    #[test]
    fn test_empty_export_is_valid() {
        let payload = response(r#"{"example_count":0,"filename":"empty.jsonl","jsonl":""}"#)
            .into_payload()
            .unwrap();
        assert_eq!(payload.example_count, 0);
        assert_eq!(payload.filename, "empty.jsonl");
    }
}
