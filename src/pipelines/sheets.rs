//! Spreadsheet analysis pipeline.
//!
//! `upload_file` → `parse_sheet` → `render_tables` → `generate_analysis`
//!
//! The parsed regions are downloaded as parquet files into the run's scratch
//! directory, rendered as Markdown, and handed to the language model for a
//! structured portfolio analysis.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{info, warn};

use super::tables;
use super::upload::UploadFile;
use super::{ANALYSIS_PROMPT, DOCUMENT_SERVICE, LANGUAGE_MODEL, RETRY_POLICY, SCRATCH_DIR};
use crate::adapters::complete_structured;
use crate::core::{Pipeline, PipelineError, Step, StepContext, StepError};
use crate::domain::{
    ChatMessage, Completion, ErrorKind, Event, EventKind, InvestmentSheetAnalysis, SheetParsed,
    TablesRendered,
};

/// Name of the structured response requested from the language model
const ANALYSIS_FORMAT: &str = "investment_sheet_analysis";

pub fn pipeline() -> Result<Pipeline, PipelineError> {
    Pipeline::builder("sheets")
        .step(UploadFile)
        .step(ParseSheet)
        .step(RenderTables)
        .step(GenerateAnalysis)
        .build()
}

/// Parses the uploaded sheet and downloads every table region
#[derive(Debug, Default)]
pub struct ParseSheet;

const PARSE_RESOURCES: &[&str] = &[
    DOCUMENT_SERVICE.name(),
    RETRY_POLICY.name(),
    SCRATCH_DIR.name(),
];

#[async_trait]
impl Step for ParseSheet {
    fn name(&self) -> &'static str {
        "parse_sheet"
    }

    fn accepts(&self) -> EventKind {
        EventKind::FileUploaded
    }

    fn emits(&self) -> &'static [EventKind] {
        &[EventKind::SheetParsed, EventKind::Completed]
    }

    fn resources(&self) -> &'static [&'static str] {
        PARSE_RESOURCES
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
        let retry = ctx.resources.get(&RETRY_POLICY)?;
        let scratch = ctx.resources.get(&SCRATCH_DIR)?;

        info!(file_id = %uploaded.file_id, "Parsing spreadsheet");
        let job = service.parse_sheet(&uploaded.file_id).await?;
        if !job.success {
            return Ok(Completion::failure(ErrorKind::NoResult, "Could not parse sheet file").into());
        }
        ctx.state.edit().await.sheet_job_id = Some(job.id.clone());

        let regions = job.regions.as_deref().ok_or_else(|| {
            StepError::data_contract(format!("Sheet job {} succeeded without regions", job.id))
        })?;
        info!(job_id = %job.id, regions = regions.len(), "Downloading table regions");

        let mut table_files: Vec<PathBuf> = Vec::with_capacity(regions.len());
        for region in regions {
            let region_id = region.region_id.as_deref().ok_or_else(|| {
                StepError::data_contract(format!("Sheet job {} returned a region without id", job.id))
            })?;

            let url = service.result_table_url(&job.id, region).await?;
            let (service, url) = (&service, url.as_str());
            let bytes = retry.run(move || service.download(url)).await?;

            let path = scratch
                .path()
                .join(format!("region_{}.parquet", file_safe(region_id)));
            tokio::fs::write(&path, &bytes).await?;
            table_files.push(path);
        }

        if table_files.is_empty() {
            return Ok(Completion::failure(
                ErrorKind::NoResult,
                "Could not retrieve any parquet file",
            )
            .into());
        }

        Ok(Event::SheetParsed(SheetParsed {
            job_id: job.id,
            table_files,
        }))
    }
}

/// Keep region ids from escaping the scratch directory
fn file_safe(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Renders every downloaded region as a Markdown table
#[derive(Debug, Default)]
pub struct RenderTables;

#[async_trait]
impl Step for RenderTables {
    fn name(&self) -> &'static str {
        "render_tables"
    }

    fn accepts(&self) -> EventKind {
        EventKind::SheetParsed
    }

    fn emits(&self) -> &'static [EventKind] {
        &[EventKind::TablesRendered, EventKind::Completed]
    }

    async fn run(&self, event: Event, _ctx: &StepContext<'_>) -> Result<Event, StepError> {
        let kind = event.kind();
        let Event::SheetParsed(parsed) = event else {
            return Err(StepError::UnexpectedEvent {
                step: self.name(),
                kind,
            });
        };

        let markdown_tables = tokio::task::spawn_blocking(move || {
            parsed
                .table_files
                .iter()
                .filter_map(|path| match tables::render_markdown(path) {
                    Ok(table) => Some(table),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Skipping unreadable table");
                        None
                    }
                })
                .collect::<Vec<_>>()
        })
        .await?;

        if markdown_tables.is_empty() {
            return Ok(Completion::failure(
                ErrorKind::NoResult,
                "Could not transform any of the parquet files",
            )
            .into());
        }

        info!(tables = markdown_tables.len(), "Tables rendered");
        Ok(Event::TablesRendered(TablesRendered { markdown_tables }))
    }
}

/// Asks the language model for a structured analysis of the tables
#[derive(Debug, Default)]
pub struct GenerateAnalysis;

const ANALYSIS_RESOURCES: &[&str] = &[
    LANGUAGE_MODEL.name(),
    ANALYSIS_PROMPT.name(),
    RETRY_POLICY.name(),
];

#[async_trait]
impl Step for GenerateAnalysis {
    fn name(&self) -> &'static str {
        "generate_analysis"
    }

    fn accepts(&self) -> EventKind {
        EventKind::TablesRendered
    }

    fn emits(&self) -> &'static [EventKind] {
        &[EventKind::Completed]
    }

    fn resources(&self) -> &'static [&'static str] {
        ANALYSIS_RESOURCES
    }

    async fn run(&self, event: Event, ctx: &StepContext<'_>) -> Result<Event, StepError> {
        let kind = event.kind();
        let Event::TablesRendered(rendered) = event else {
            return Err(StepError::UnexpectedEvent {
                step: self.name(),
                kind,
            });
        };

        let model = ctx.resources.get(&LANGUAGE_MODEL)?;
        let prompt = ctx.resources.get(&ANALYSIS_PROMPT)?;
        let retry = ctx.resources.get(&RETRY_POLICY)?;

        let user_prompt = prompt.render(&rendered.markdown_tables.join("\n\n"))?;
        let history = {
            let mut state = ctx.state.edit().await;
            state.chat_history.push(ChatMessage::user(user_prompt));
            state.chat_history.clone()
        };

        info!(model = model.model(), "Generating analysis");
        let reply = complete_structured::<InvestmentSheetAnalysis>(
            model.as_ref(),
            &history,
            ANALYSIS_FORMAT,
            &retry,
        )
        .await?;

        let Some(reply) = reply else {
            return Ok(Completion::failure(
                ErrorKind::NoResult,
                "Could not generate investment analysis",
            )
            .into());
        };

        ctx.state
            .edit()
            .await
            .chat_history
            .push(ChatMessage::assistant(reply.raw));

        Ok(Completion::success(reply.value.to_string()).into())
    }
}
