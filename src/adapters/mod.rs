//! Adapter interfaces for external systems.
//!
//! Adapters provide a narrow interface over the two remote services the
//! pipelines talk to:
//! - DocumentService: upload, classification, extraction and sheet parsing
//! - LanguageModel: structured chat completion
//!
//! Steps only see the traits, so tests substitute in-process fakes.

pub mod llama_cloud;
pub mod openai;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use async_trait::async_trait;

use crate::core::retry::RetryPolicy;
use crate::domain::{ChatHistory, ErrorKind};

pub use llama_cloud::LlamaCloudClient;
pub use openai::OpenAiClient;

/// Failure talking to a remote service
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Job {job} ended with status {status:?}")]
    JobFailed { job: String, status: JobStatus },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Http(_) | Self::Api { .. } | Self::JobFailed { .. } => ErrorKind::Remote,
            Self::InvalidResponse(_) => ErrorKind::DataContract,
            Self::Io(_) => ErrorKind::Internal,
        }
    }
}

/// Lifecycle of an asynchronous LlamaCloud job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Success,
    PartialSuccess,
    Error,
    Cancelled,
    /// Any status this client does not know; treated as still running
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    pub fn is_finished(self) -> bool {
        matches!(
            self,
            Self::Success | Self::PartialSuccess | Self::Error | Self::Cancelled
        )
    }

    pub fn is_success(self) -> bool {
        matches!(self, Self::Success | Self::PartialSuccess)
    }
}

/// A document to upload
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub external_file_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub id: String,
}

/// One category the classifier may assign
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierRule {
    #[serde(rename = "type")]
    pub type_: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassifyResponse {
    #[serde(default)]
    pub items: Vec<ClassifyItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifyItem {
    #[serde(default)]
    pub file_id: Option<String>,

    #[serde(default)]
    pub result: Option<ClassifyResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifyResult {
    #[serde(rename = "type")]
    pub type_: String,

    #[serde(default)]
    pub reasoning: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResponse {
    #[serde(default)]
    pub data: Option<Value>,
}

/// Result of a sheet parsing job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetParseJob {
    pub id: String,
    pub success: bool,

    /// Present when `success` is true
    #[serde(default)]
    pub regions: Option<Vec<SheetRegion>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetRegion {
    #[serde(default)]
    pub region_id: Option<String>,
    pub region_type: String,
}

/// Cloud service for document upload and understanding
#[async_trait]
pub trait DocumentService: Send + Sync {
    async fn upload(&self, file: FileUpload) -> Result<UploadedFile, ServiceError>;

    async fn classify(
        &self,
        file_ids: &[String],
        rules: &[ClassifierRule],
    ) -> Result<ClassifyResponse, ServiceError>;

    async fn extract(&self, file_id: &str, schema: &Value)
        -> Result<ExtractionResponse, ServiceError>;

    async fn parse_sheet(&self, file_id: &str) -> Result<SheetParseJob, ServiceError>;

    /// Download URL of a parsed region's result table
    async fn result_table_url(
        &self,
        job_id: &str,
        region: &SheetRegion,
    ) -> Result<String, ServiceError>;

    async fn download(&self, url: &str) -> Result<Vec<u8>, ServiceError>;
}

/// Requested shape of a structured completion
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseFormat {
    pub name: String,
    pub schema: Value,
}

impl ResponseFormat {
    /// Format whose schema is generated from `T`
    pub fn of<T: JsonSchema>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: serde_json::to_value(schemars::schema_for!(T)).unwrap_or_default(),
        }
    }
}

/// Chat model producing JSON that follows a schema
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model(&self) -> &str;

    /// Raw JSON text of the reply, or None if the model declined to answer
    async fn complete(
        &self,
        history: &ChatHistory,
        format: &ResponseFormat,
    ) -> Result<Option<String>, ServiceError>;
}

/// A parsed structured reply plus its raw text
#[derive(Debug, Clone)]
pub struct Structured<T> {
    pub value: T,
    pub raw: String,
}

/// Ask `model` for a `T`, retrying failed calls and unparseable replies.
///
/// `Ok(None)` means the model answered without usable content; that is not
/// retried.
pub async fn complete_structured<T>(
    model: &dyn LanguageModel,
    history: &ChatHistory,
    name: &str,
    retry: &RetryPolicy,
) -> Result<Option<Structured<T>>, ServiceError>
where
    T: DeserializeOwned + JsonSchema,
{
    let format = &ResponseFormat::of::<T>(name);

    retry
        .run(move || async move {
            let Some(raw) = model.complete(history, format).await? else {
                return Ok::<_, ServiceError>(None);
            };
            let value = serde_json::from_str::<T>(&raw).map_err(|e| {
                ServiceError::InvalidResponse(format!("reply does not match '{}': {}", name, e))
            })?;
            Ok(Some(Structured { value, raw }))
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_error_kinds() {
        assert_eq!(
            ServiceError::Api {
                status: 500,
                message: "boom".to_string()
            }
            .kind(),
            ErrorKind::Remote
        );
        assert_eq!(
            ServiceError::InvalidResponse("x".to_string()).kind(),
            ErrorKind::DataContract
        );
    }

    #[test]
    fn test_classify_response_tolerates_missing_result() {
        let response: ClassifyResponse = serde_json::from_str(
            r#"{"items": [{"file_id": "f1", "result": null}]}"#,
        )
        .unwrap();
        assert_eq!(response.items.len(), 1);
        assert!(response.items[0].result.is_none());

        let empty: ClassifyResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.items.is_empty());
    }

    #[test]
    fn test_classifier_rule_uses_type_key() {
        let rule = ClassifierRule {
            type_: "board_update_deck".to_string(),
            description: "Board deck".to_string(),
        };
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(json["type"], "board_update_deck");
    }

    #[test]
    fn test_sheet_job_regions_optional() {
        let job: SheetParseJob =
            serde_json::from_str(r#"{"id": "job-1", "success": false}"#).unwrap();
        assert!(!job.success);
        assert!(job.regions.is_none());
    }
}
