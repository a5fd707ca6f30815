//! OpenAI Responses API client for structured completions.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{LanguageModel, ResponseFormat, ServiceError};
use crate::config::LlmConfig;
use crate::core::error::ResourceError;
use crate::domain::ChatHistory;

/// OpenAI API client
pub struct OpenAiClient {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ResponsesBody {
    #[serde(default)]
    output: Vec<OutputItem>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OutputItem {
    Message {
        #[serde(default)]
        content: Vec<ContentPart>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    OutputText { text: String },
    Refusal { refusal: String },
    #[serde(other)]
    Other,
}

impl OpenAiClient {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Create from config; fails if no API key is available
    pub fn from_config(config: &LlmConfig) -> Result<Self, ResourceError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or(ResourceError::MissingCredential {
                resource: "language_model",
                variable: "OPENAI_API_KEY",
            })?;

        Ok(Self::new(api_key, config.model.clone(), config.base_url.clone()))
    }

    fn responses_url(&self) -> String {
        format!("{}/responses", self.base_url.trim_end_matches('/'))
    }

    fn request_body(&self, history: &ChatHistory, format: &ResponseFormat) -> Value {
        json!({
            "model": self.model,
            "input": history.messages(),
            "text": {
                "format": {
                    "type": "json_schema",
                    "name": format.name,
                    "schema": format.schema,
                    "strict": false,
                }
            }
        })
    }
}

/// Concatenated output text, or None when the model refused or said nothing
fn output_text(body: ResponsesBody) -> Option<String> {
    let mut text = String::new();

    for item in body.output {
        let OutputItem::Message { content } = item else {
            continue;
        };
        for part in content {
            match part {
                ContentPart::OutputText { text: chunk } => text.push_str(&chunk),
                ContentPart::Refusal { refusal } => {
                    warn!(%refusal, "Model refused to answer");
                    return None;
                }
                ContentPart::Other => {}
            }
        }
    }

    (!text.is_empty()).then_some(text)
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        history: &ChatHistory,
        format: &ResponseFormat,
    ) -> Result<Option<String>, ServiceError> {
        debug!(model = %self.model, messages = history.len(), format = %format.name, "Requesting completion");

        let response = self
            .client
            .post(self.responses_url())
            .bearer_auth(&self.api_key)
            .json(&self.request_body(history, format))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ServiceError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let bytes = response.bytes().await?;
        let body: ResponsesBody = serde_json::from_slice(&bytes)
            .map_err(|e| ServiceError::InvalidResponse(e.to_string()))?;

        Ok(output_text(body))
    }
}
