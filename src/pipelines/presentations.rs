//! Presentation classification and extraction pipeline.
//!
//! `upload_file` → `classify_presentation` → `extract_details`

use async_trait::async_trait;
use tracing::info;

use super::upload::UploadFile;
use super::DOCUMENT_SERVICE;
use crate::adapters::ClassifierRule;
use crate::core::{Pipeline, PipelineError, Step, StepContext, StepError};
use crate::domain::{Classified, Completion, ErrorKind, Event, EventKind, PresentationKind};

const RESOURCES: &[&str] = &[DOCUMENT_SERVICE.name()];

pub fn pipeline() -> Result<Pipeline, PipelineError> {
    Pipeline::builder("presentations")
        .step(UploadFile)
        .step(ClassifyPresentation)
        .step(ExtractDetails)
        .build()
}

/// One rule per known presentation category
pub fn classifier_rules() -> Vec<ClassifierRule> {
    PresentationKind::ALL
        .into_iter()
        .map(|kind| ClassifierRule {
            type_: kind.label().to_string(),
            description: kind.description().to_string(),
        })
        .collect()
}

#[derive(Debug, Default)]
pub struct ClassifyPresentation;

#[async_trait]
impl Step for ClassifyPresentation {
    fn name(&self) -> &'static str {
        "classify_presentation"
    }

    fn accepts(&self) -> EventKind {
        EventKind::FileUploaded
    }

    fn emits(&self) -> &'static [EventKind] {
        &[EventKind::Classified, EventKind::Completed]
    }

    fn resources(&self) -> &'static [&'static str] {
        RESOURCES
    }

    async fn run(&self, event: Event, ctx: &StepContext<'_>) -> Result<Event, StepError> {
        let kind = event.kind();
        let Event::FileUploaded(uploaded) = event else {
            return Err(StepError::UnexpectedEvent {
                step: self.name(),
                kind,
            });
        };

        let service = ctx.resources.get(&DOCUMENT_SERVICE)?;

        info!(file_id = %uploaded.file_id, "Classifying presentation");
        let response = service
            .classify(&[uploaded.file_id], &classifier_rules())
            .await?;

        // Single file in, single item out
        let Some(result) = response.items.into_iter().next().and_then(|item| item.result) else {
            return Ok(Completion::failure(
                ErrorKind::NoResult,
                "Could not produce a classification",
            )
            .into());
        };

        let category = PresentationKind::from_label(&result.type_).ok_or_else(|| {
            StepError::data_contract(format!(
                "Unknown presentation category '{}'",
                result.type_
            ))
        })?;

        info!(%category, confidence = ?result.confidence, "Presentation classified");
        Ok(Event::Classified(Classified {
            category,
            reasons: result.reasoning,
        }))
    }
}

#[derive(Debug, Default)]
pub struct ExtractDetails;

#[async_trait]
impl Step for ExtractDetails {
    fn name(&self) -> &'static str {
        "extract_details"
    }

    fn accepts(&self) -> EventKind {
        EventKind::Classified
    }

    fn emits(&self) -> &'static [EventKind] {
        &[EventKind::Completed]
    }

    fn resources(&self) -> &'static [&'static str] {
        RESOURCES
    }

    async fn run(&self, event: Event, ctx: &StepContext<'_>) -> Result<Event, StepError> {
        let kind = event.kind();
        let Event::Classified(classified) = event else {
            return Err(StepError::UnexpectedEvent {
                step: self.name(),
                kind,
            });
        };

        let file_id = ctx
            .state
            .read()
            .await
            .file_id
            .ok_or(StepError::MissingState("file_id"))?;
        let service = ctx.resources.get(&DOCUMENT_SERVICE)?;

        info!(%file_id, category = %classified.category, "Extracting details");
        let schema = classified.category.extraction_schema();
        let response = service.extract(&file_id, &schema).await?;

        let Some(data) = response.data else {
            return Ok(Completion::failure(
                ErrorKind::NoResult,
                "Could not extract details from document",
            )
            .into());
        };

        let record = classified.category.format_record(data).map_err(|e| {
            StepError::data_contract(format!(
                "Extracted data does not match '{}': {}",
                classified.category, e
            ))
        })?;

        Ok(Completion::success(record).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classifier_rules_cover_every_kind() {
        let rules = classifier_rules();
        let labels: Vec<_> = rules.iter().map(|r| r.type_.as_str()).collect();

        assert_eq!(labels, vec!["management_presentation", "board_update_deck"]);
        assert!(rules.iter().all(|r| !r.description.is_empty()));
    }

    #[test]
    fn test_pipeline_routes() {
        let pipeline = pipeline().unwrap();
        assert_eq!(
            pipeline.step_for(EventKind::FileUploaded).unwrap().name(),
            "classify_presentation"
        );
        assert_eq!(
            pipeline.step_for(EventKind::Classified).unwrap().name(),
            "extract_details"
        );
        assert_eq!(pipeline.required_resources(), vec!["document_service"]);
    }
}
