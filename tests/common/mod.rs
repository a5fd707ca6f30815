//! Shared fixtures for integration tests: in-process service fakes and a
//! parquet writer.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use parquet::data_type::{ByteArray, ByteArrayType, DoubleType};
use parquet::file::properties::WriterProperties;
use parquet::file::writer::SerializedFileWriter;
use parquet::schema::parser::parse_message_type;
use serde_json::Value;

use folio::adapters::{
    ClassifierRule, ClassifyItem, ClassifyResponse, ClassifyResult, DocumentService,
    ExtractionResponse, FileUpload, LanguageModel, ResponseFormat, ServiceError, SheetParseJob,
    SheetRegion, UploadedFile,
};
use folio::config::Config;
use folio::core::{Orchestrator, ResourceResolver, RetryPolicy, Scope};
use folio::domain::ChatHistory;
use folio::pipelines::{default_registry, PipelineKind, DOCUMENT_SERVICE, LANGUAGE_MODEL};

/// Scripted document service
#[derive(Default)]
pub struct FakeDocuments {
    pub classification: Mutex<Option<ClassifyResponse>>,
    pub extraction: Mutex<Option<Value>>,
    pub sheet_job: Mutex<Option<SheetParseJob>>,

    /// Parquet bytes by region id
    pub tables: Mutex<HashMap<String, Vec<u8>>>,

    /// Downloads that fail before one succeeds
    pub download_failures: AtomicUsize,

    pub uploads: Mutex<Vec<FileUpload>>,
    pub classify_rules: Mutex<Vec<ClassifierRule>>,
    pub extract_schemas: Mutex<Vec<Value>>,
    pub download_attempts: AtomicUsize,
}

impl FakeDocuments {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn classify_as(&self, label: &str) {
        *self.classification.lock().unwrap() = Some(ClassifyResponse {
            items: vec![ClassifyItem {
                file_id: Some("file-1".to_string()),
                result: Some(ClassifyResult {
                    type_: label.to_string(),
                    reasoning: format!("looks like a {}", label),
                    confidence: Some(0.9),
                }),
            }],
        });
    }

    pub fn unclassifiable(&self) {
        *self.classification.lock().unwrap() = Some(ClassifyResponse {
            items: vec![ClassifyItem {
                file_id: Some("file-1".to_string()),
                result: None,
            }],
        });
    }

    pub fn extract_returns(&self, data: Option<Value>) {
        *self.extraction.lock().unwrap() = data;
    }

    /// Successful sheet job with one region per table
    pub fn sheet_with_tables(&self, tables: Vec<(&str, Vec<u8>)>) {
        let regions = tables
            .iter()
            .map(|(id, _)| SheetRegion {
                region_id: Some(id.to_string()),
                region_type: "table".to_string(),
            })
            .collect();
        *self.sheet_job.lock().unwrap() = Some(SheetParseJob {
            id: "job-1".to_string(),
            success: true,
            regions: Some(regions),
        });
        *self.tables.lock().unwrap() = tables
            .into_iter()
            .map(|(id, bytes)| (id.to_string(), bytes))
            .collect();
    }

    pub fn sheet_job(&self, job: SheetParseJob) {
        *self.sheet_job.lock().unwrap() = Some(job);
    }
}

#[async_trait]
impl DocumentService for FakeDocuments {
    async fn upload(&self, file: FileUpload) -> Result<UploadedFile, ServiceError> {
        self.uploads.lock().unwrap().push(file);
        Ok(UploadedFile {
            id: "file-1".to_string(),
        })
    }

    async fn classify(
        &self,
        _file_ids: &[String],
        rules: &[ClassifierRule],
    ) -> Result<ClassifyResponse, ServiceError> {
        self.classify_rules.lock().unwrap().extend_from_slice(rules);
        Ok(self.classification.lock().unwrap().clone().unwrap_or_default())
    }

    async fn extract(&self, _file_id: &str, schema: &Value) -> Result<ExtractionResponse, ServiceError> {
        self.extract_schemas.lock().unwrap().push(schema.clone());
        Ok(ExtractionResponse {
            data: self.extraction.lock().unwrap().clone(),
        })
    }

    async fn parse_sheet(&self, _file_id: &str) -> Result<SheetParseJob, ServiceError> {
        self.sheet_job
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ServiceError::InvalidResponse("no sheet job scripted".to_string()))
    }

    async fn result_table_url(&self, job_id: &str, region: &SheetRegion) -> Result<String, ServiceError> {
        Ok(format!(
            "mem://{}/{}",
            job_id,
            region.region_id.clone().unwrap_or_default()
        ))
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, ServiceError> {
        self.download_attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.download_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.download_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(ServiceError::Api {
                status: 503,
                message: "temporarily unavailable".to_string(),
            });
        }

        let region = url.rsplit('/').next().unwrap_or_default();
        self.tables
            .lock()
            .unwrap()
            .get(region)
            .cloned()
            .ok_or_else(|| ServiceError::Api {
                status: 404,
                message: url.to_string(),
            })
    }
}

/// Scripted language model; replies are consumed in order
#[derive(Default)]
pub struct FakeModel {
    pub replies: Mutex<VecDeque<Result<Option<String>, ServiceError>>>,
    pub histories: Mutex<Vec<ChatHistory>>,
    pub formats: Mutex<Vec<ResponseFormat>>,
}

impl FakeModel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, reply: Result<Option<String>, ServiceError>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn calls(&self) -> usize {
        self.histories.lock().unwrap().len()
    }
}

#[async_trait]
impl LanguageModel for FakeModel {
    fn model(&self) -> &str {
        "fake-model"
    }

    async fn complete(
        &self,
        history: &ChatHistory,
        format: &ResponseFormat,
    ) -> Result<Option<String>, ServiceError> {
        self.histories.lock().unwrap().push(history.clone());
        self.formats.lock().unwrap().push(format.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(None))
    }
}

/// Defaults with millisecond retry delays
pub fn test_config() -> Config {
    Config {
        retry: RetryPolicy {
            max_retries: 3,
            retry_interval_ms: 1,
            max_retry_interval_ms: 5,
            ..RetryPolicy::default()
        },
        ..Config::default()
    }
}

/// Orchestrator whose remote services are the given fakes
pub fn orchestrator(
    kind: PipelineKind,
    documents: Arc<FakeDocuments>,
    model: Arc<FakeModel>,
    config: Config,
) -> Orchestrator {
    let mut registry = default_registry();

    let documents: Arc<dyn DocumentService> = documents;
    registry.register(&DOCUMENT_SERVICE, Scope::Process, move |_: &Config| {
        Ok(Arc::clone(&documents))
    });

    let model: Arc<dyn LanguageModel> = model;
    registry.register(&LANGUAGE_MODEL, Scope::Process, move |_: &Config| {
        Ok(Arc::clone(&model))
    });

    let resolver = ResourceResolver::new(config, registry);
    Orchestrator::new(kind.pipeline().unwrap(), resolver).unwrap()
}

/// Parquet file with a string `fund` column and a double `value` column
pub fn parquet_table(rows: &[(&str, f64)]) -> Vec<u8> {
    let schema = Arc::new(
        parse_message_type(
            "message region {
                REQUIRED BYTE_ARRAY fund (UTF8);
                REQUIRED DOUBLE value;
            }",
        )
        .unwrap(),
    );
    let props = Arc::new(WriterProperties::builder().build());

    let funds: Vec<ByteArray> = rows.iter().map(|(fund, _)| ByteArray::from(*fund)).collect();
    let values: Vec<f64> = rows.iter().map(|(_, value)| *value).collect();

    let mut buffer = Vec::new();
    {
        let mut writer = SerializedFileWriter::new(&mut buffer, schema, props).unwrap();
        let mut row_group = writer.next_row_group().unwrap();

        let mut fund_column = row_group.next_column().unwrap().unwrap();
        fund_column
            .typed::<ByteArrayType>()
            .write_batch(&funds, None, None)
            .unwrap();
        fund_column.close().unwrap();

        let mut value_column = row_group.next_column().unwrap().unwrap();
        value_column
            .typed::<DoubleType>()
            .write_batch(&values, None, None)
            .unwrap();
        value_column.close().unwrap();

        row_group.close().unwrap();
        writer.close().unwrap();
    }
    buffer
}

/// Well-formed analysis reply
pub fn analysis_json() -> String {
    serde_json::json!({
        "general_trend": "upward",
        "best_performing": "Alpha Fund gained the most",
        "worst_performing": "Gamma Fund lost value",
        "suggestions": ["Trim Gamma Fund"]
    })
    .to_string()
}
