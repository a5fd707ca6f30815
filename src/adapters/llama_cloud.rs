//! LlamaCloud REST client.
//!
//! Covers the endpoints the pipelines use: file upload, classification,
//! extraction, spreadsheet parsing and result-table download. Every call uses
//! bearer auth; downloads go to pre-signed URLs without auth.
//!
//! Classification, extraction and sheet parsing run as server-side jobs: the
//! client creates the job, then polls its status until it finishes. Polling
//! has no deadline of its own; the orchestrator's step and run timeouts drop
//! the future.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{
    ClassifierRule, ClassifyResponse, DocumentService, ExtractionResponse, FileUpload,
    JobStatus, ServiceError, SheetParseJob, SheetRegion, UploadedFile,
};
use crate::config::LlamaCloudConfig;
use crate::core::error::ResourceError;

/// Processing mode for classification and extraction
const FAST_MODE: &str = "FAST";

/// Purpose attached to uploaded files
const UPLOAD_PURPOSE: &str = "parse";

/// LlamaCloud API client
pub struct LlamaCloudClient {
    /// API key
    api_key: String,
    /// Base URL without the /api/v1 suffix
    base_url: String,
    /// HTTP client
    client: reqwest::Client,
    /// Delay between job status checks
    poll_interval: Duration,
}

#[derive(Debug, Deserialize)]
struct ResultTable {
    url: String,
}

/// Response to a job creation request
#[derive(Debug, Deserialize)]
struct JobHandle {
    id: String,
}

#[derive(Debug, Deserialize)]
struct JobState {
    status: JobStatus,
}

/// Sheet job as returned by the status endpoint
#[derive(Debug, Deserialize)]
struct SheetJobBody {
    id: String,
    status: JobStatus,
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    regions: Option<Vec<SheetRegion>>,
}

impl From<SheetJobBody> for SheetParseJob {
    fn from(body: SheetJobBody) -> Self {
        Self {
            id: body.id,
            success: body.success.unwrap_or(body.status.is_success()),
            regions: body.regions,
        }
    }
}

/// Poll `fetch` until it reports a finished status, sleeping `interval`
/// between checks. Request errors end the wait immediately.
async fn wait_for_job<T, F, Fut>(
    job_id: &str,
    interval: Duration,
    mut fetch: F,
) -> Result<(JobStatus, T), ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(JobStatus, T), ServiceError>>,
{
    let mut checks: u32 = 0;
    loop {
        let (status, body) = fetch().await?;
        checks += 1;

        if status.is_finished() {
            debug!(job = job_id, ?status, checks, "Job finished");
            return Ok((status, body));
        }

        debug!(job = job_id, ?status, checks, "Job still running");
        tokio::time::sleep(interval).await;
    }
}

impl LlamaCloudClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            client: reqwest::Client::new(),
            poll_interval: Duration::from_secs(1),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Create from config; fails if no API key is available
    pub fn from_config(config: &LlamaCloudConfig) -> Result<Self, ResourceError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or(ResourceError::MissingCredential {
                resource: "document_service",
                variable: "LLAMA_CLOUD_API_KEY",
            })?;

        Ok(Self::new(api_key, config.base_url.clone())
            .with_poll_interval(Duration::from_millis(config.poll_interval_ms)))
    }

    /// Build API URL
    fn api_url(&self, path: &str) -> String {
        format!(
            "{}/api/v1/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ServiceError> {
        let response = request.bearer_auth(&self.api_key).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ServiceError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| ServiceError::InvalidResponse(e.to_string()))
    }

    /// Create a job with a JSON body and return its id
    async fn create_job(&self, path: &str, body: &Value) -> Result<String, ServiceError> {
        let handle: JobHandle = self
            .send_json(self.client.post(self.api_url(path)).json(body))
            .await?;
        debug!(job = %handle.id, path, "Job created");
        Ok(handle.id)
    }

    /// Wait for a job whose status lives at `jobs_path/{id}`; anything but
    /// success is a failure
    async fn await_job(&self, jobs_path: &str, job_id: &str) -> Result<(), ServiceError> {
        let url = self.api_url(&format!("{}/{}", jobs_path, job_id));
        let (url, this) = (&url, self);

        let (status, ()) = wait_for_job(job_id, self.poll_interval, move || async move {
            let state: JobState = this.send_json(this.client.get(url)).await?;
            Ok((state.status, ()))
        })
        .await?;

        if status.is_success() {
            Ok(())
        } else {
            Err(ServiceError::JobFailed {
                job: job_id.to_string(),
                status,
            })
        }
    }
}

fn classify_body(file_ids: &[String], rules: &[ClassifierRule]) -> Value {
    json!({
        "file_ids": file_ids,
        "rules": rules,
        "mode": FAST_MODE,
    })
}

fn extraction_body(file_id: &str, schema: &Value) -> Value {
    json!({
        "file_id": file_id,
        "data_schema": schema,
        "config": { "extraction_mode": FAST_MODE },
    })
}

#[async_trait]
impl DocumentService for LlamaCloudClient {
    async fn upload(&self, file: FileUpload) -> Result<UploadedFile, ServiceError> {
        debug!(file_name = %file.file_name, bytes = file.bytes.len(), "Uploading file");

        let part = Part::bytes(file.bytes)
            .file_name(file.file_name)
            .mime_str(&file.mime_type)?;

        let form = Form::new()
            .part("upload_file", part)
            .text("purpose", UPLOAD_PURPOSE)
            .text("external_file_id", file.external_file_id);

        self.send_json(self.client.post(self.api_url("files")).multipart(form))
            .await
    }

    async fn classify(
        &self,
        file_ids: &[String],
        rules: &[ClassifierRule],
    ) -> Result<ClassifyResponse, ServiceError> {
        let job = self
            .create_job("classifier/jobs", &classify_body(file_ids, rules))
            .await?;
        self.await_job("classifier/jobs", &job).await?;

        let results = self.api_url(&format!("classifier/jobs/{}/results", job));
        self.send_json(self.client.get(results)).await
    }

    async fn extract(&self, file_id: &str, schema: &Value) -> Result<ExtractionResponse, ServiceError> {
        let job = self
            .create_job("extraction/run", &extraction_body(file_id, schema))
            .await?;
        self.await_job("extraction/jobs", &job).await?;

        let result = self.api_url(&format!("extraction/jobs/{}/result", job));
        self.send_json(self.client.get(result)).await
    }

    /// A failed job is returned with `success: false` rather than as an error
    async fn parse_sheet(&self, file_id: &str) -> Result<SheetParseJob, ServiceError> {
        let job = self
            .create_job("beta/sheets/jobs", &json!({ "file_id": file_id }))
            .await?;

        let url = self.api_url(&format!("beta/sheets/jobs/{}", job));
        let (url, this) = (&url, self);
        let (_, body) = wait_for_job(&job, self.poll_interval, move || async move {
            let body: SheetJobBody = this
                .send_json(this.client.get(url).query(&[("include_results", "true")]))
                .await?;
            Ok((body.status, body))
        })
        .await?;

        Ok(body.into())
    }

    async fn result_table_url(&self, job_id: &str, region: &SheetRegion) -> Result<String, ServiceError> {
        let region_id = region.region_id.as_deref().ok_or_else(|| {
            ServiceError::InvalidResponse("sheet region has no id".to_string())
        })?;

        let path = format!(
            "beta/sheets/jobs/{}/regions/{}/result/{}",
            job_id, region_id, region.region_type
        );
        let table: ResultTable = self.send_json(self.client.get(self.api_url(&path))).await?;
        Ok(table.url)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, ServiceError> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::Api {
                status: status.as_u16(),
                message: format!("download failed: {}", url),
            });
        }

        Ok(response.bytes().await?.to_vec())
    }
}
