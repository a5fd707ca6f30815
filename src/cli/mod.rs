//! Command-line interface for folio.
//!
//! Provides commands for running a document through one of the pipelines and
//! for inspecting the resolved configuration.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use clap::{Parser, Subcommand, ValueEnum};

use crate::config::Config;
use crate::domain::{ErrorKind, FileSubmitted};
use crate::pipelines::PipelineKind;

/// folio - Document analysis pipelines over LlamaCloud and OpenAI
#[derive(Parser, Debug)]
#[command(name = "folio")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (defaults to $FOLIO_CONFIG, then .folio/config.yaml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a document through a pipeline
    Run {
        /// Pipeline to run
        #[arg(value_enum)]
        pipeline: PipelineArg,

        /// Document to process
        file: PathBuf,

        /// Send the document as inline base64 content instead of a path
        #[arg(long)]
        inline: bool,

        /// Print intermediate events to stderr
        #[arg(long)]
        progress: bool,

        /// Print the completion as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show resolved configuration (secrets hidden)
    Config,
}

/// Pipeline name for CLI (maps to PipelineKind)
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PipelineArg {
    /// Spreadsheet portfolio analysis
    Sheets,

    /// Slide deck classification and extraction
    Presentations,
}

impl From<PipelineArg> for PipelineKind {
    fn from(arg: PipelineArg) -> Self {
        match arg {
            PipelineArg::Sheets => PipelineKind::Sheets,
            PipelineArg::Presentations => PipelineKind::Presentations,
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let config_path = self.config.as_deref();

        match self.command {
            Commands::Run {
                pipeline,
                file,
                inline,
                progress,
                json,
            } => run_pipeline(pipeline.into(), &file, inline, progress, json, config_path).await,
            Commands::Config => show_config(config_path),
        }
    }
}

async fn run_pipeline(
    kind: PipelineKind,
    file: &Path,
    inline: bool,
    progress: bool,
    json: bool,
    config_path: Option<&Path>,
) -> Result<()> {
    let config = Config::load(config_path)?;
    let orchestrator = kind
        .orchestrator(config)
        .with_context(|| format!("Failed to assemble pipeline '{}'", kind.name()))?;

    let input = build_input(kind, file, inline).await?;

    let mut handle = orchestrator.spawn(input);
    let run_id = handle.run_id;
    eprintln!("[Run {} started: {}]", run_id, kind.name());

    while let Some(streamed) = handle.events.next().await {
        if progress && !streamed.event.is_terminal() {
            eprintln!(
                "  [{}] {} -> {}",
                streamed.sequence,
                streamed.step.as_deref().unwrap_or("-"),
                streamed.event.kind()
            );
        }
    }

    let completion = handle.wait().await;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&completion).context("Failed to serialize completion")?
        );
    }

    match completion.outcome() {
        Ok(result) => {
            if !json {
                println!("{}", result);
            }
            eprintln!("\n[Run {} completed successfully]", run_id);
            Ok(())
        }
        Err(error) => {
            let kind = completion.error_kind().unwrap_or(ErrorKind::Internal);
            eprintln!("\n[Run {} failed ({}): {}]", run_id, kind, error);
            std::process::exit(1);
        }
    }
}

/// Start event for `file`, either by path or as inline content
async fn build_input(kind: PipelineKind, file: &Path, inline: bool) -> Result<FileSubmitted> {
    if !inline {
        return Ok(FileSubmitted::from_path(file, kind.file_type()));
    }

    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read input file: {}", file.display()))?;

    let mut input = FileSubmitted::inline(STANDARD.encode(bytes), kind.file_type());
    if let Some(name) = file.file_name() {
        input = input.with_file_name(name.to_string_lossy());
    }
    if let Some(ext) = file.extension() {
        input = input.with_extension(format!(".{}", ext.to_string_lossy()));
    }
    Ok(input)
}

/// Show resolved configuration
fn show_config(config_path: Option<&Path>) -> Result<()> {
    let config = Config::load(config_path)?;

    println!("folio configuration");
    println!();
    println!(
        "Config file: {}",
        config
            .config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Credentials:");
    println!("  LlamaCloud API key: {}", presence(config.llama_cloud.api_key.as_deref()));
    println!("  OpenAI API key:     {}", presence(config.llm.api_key.as_deref()));
    println!();
    print!(
        "{}",
        serde_yaml::to_string(&config).context("Failed to serialize configuration")?
    );

    Ok(())
}

fn presence(secret: Option<&str>) -> &'static str {
    match secret {
        Some(_) => "set",
        None => "not set",
    }
}
