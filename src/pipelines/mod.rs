//! Concrete document pipelines.
//!
//! - Sheets: upload, parse into table regions, render tables, analyze
//! - Presentations: upload, classify, extract a structured record
//!
//! Both share the upload step and the default resource registrations below.

pub mod presentations;
pub mod prompt;
pub mod sheets;
pub mod tables;
pub mod upload;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use crate::adapters::{DocumentService, LanguageModel, LlamaCloudClient, OpenAiClient};
use crate::config::Config;
use crate::core::{
    Orchestrator, Pipeline, PipelineError, ResourceError, ResourceId, ResourceRegistry,
    ResourceResolver, RetryPolicy, Scope,
};
use crate::domain::FileType;

pub use prompt::PromptTemplate;

pub const DOCUMENT_SERVICE: ResourceId<Arc<dyn DocumentService>> =
    ResourceId::new("document_service");
pub const LANGUAGE_MODEL: ResourceId<Arc<dyn LanguageModel>> = ResourceId::new("language_model");
pub const ANALYSIS_PROMPT: ResourceId<Arc<PromptTemplate>> = ResourceId::new("analysis_prompt");
pub const RETRY_POLICY: ResourceId<RetryPolicy> = ResourceId::new("retry_policy");

/// Per-run directory for downloaded tables, removed when the run ends
pub const SCRATCH_DIR: ResourceId<Arc<TempDir>> = ResourceId::new("scratch_dir");

/// Which pipeline to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineKind {
    Sheets,
    Presentations,
}

impl PipelineKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Sheets => "sheets",
            Self::Presentations => "presentations",
        }
    }

    /// Document type this pipeline expects
    pub fn file_type(self) -> FileType {
        match self {
            Self::Sheets => FileType::Spreadsheet,
            Self::Presentations => FileType::SlideDeck,
        }
    }

    pub fn pipeline(self) -> Result<Pipeline, PipelineError> {
        match self {
            Self::Sheets => sheets::pipeline(),
            Self::Presentations => presentations::pipeline(),
        }
    }

    /// Orchestrator wired with the default resource registrations
    pub fn orchestrator(self, config: Config) -> Result<Orchestrator, PipelineError> {
        let resolver = ResourceResolver::new(config, default_registry());
        Orchestrator::new(self.pipeline()?, resolver)
    }
}

/// Production resource registrations
pub fn default_registry() -> ResourceRegistry {
    let mut registry = ResourceRegistry::new();

    registry
        .register(&DOCUMENT_SERVICE, Scope::Process, |config: &Config| {
            let client = LlamaCloudClient::from_config(&config.llama_cloud)?;
            Ok(Arc::new(client) as Arc<dyn DocumentService>)
        })
        .register(&LANGUAGE_MODEL, Scope::Process, |config: &Config| {
            let client = OpenAiClient::from_config(&config.llm)?;
            Ok(Arc::new(client) as Arc<dyn LanguageModel>)
        })
        .register(&ANALYSIS_PROMPT, Scope::Process, |_: &Config| {
            PromptTemplate::analysis()
                .map(Arc::new)
                .map_err(|e| ResourceError::Build {
                    resource: ANALYSIS_PROMPT.name(),
                    message: e.to_string(),
                })
        })
        .register(&RETRY_POLICY, Scope::Process, |config: &Config| {
            Ok(config.retry.clone())
        })
        .register(&SCRATCH_DIR, Scope::Run, |_: &Config| {
            tempfile::Builder::new()
                .prefix("folio-")
                .tempdir()
                .map(Arc::new)
                .map_err(|e| ResourceError::Build {
                    resource: SCRATCH_DIR.name(),
                    message: e.to_string(),
                })
        });

    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_scopes() {
        let registry = default_registry();

        for id in [
            DOCUMENT_SERVICE.name(),
            LANGUAGE_MODEL.name(),
            ANALYSIS_PROMPT.name(),
            RETRY_POLICY.name(),
        ] {
            assert_eq!(registry.scope(id), Some(Scope::Process), "{}", id);
        }
        assert_eq!(registry.scope(SCRATCH_DIR.name()), Some(Scope::Run));
    }

    #[test]
    fn test_both_pipelines_assemble() {
        let config = Config::default();
        assert!(PipelineKind::Sheets.orchestrator(config.clone()).is_ok());
        assert!(PipelineKind::Presentations.orchestrator(config).is_ok());
    }

    #[test]
    fn test_missing_credentials_surface_on_resolution() {
        let resolver = ResourceResolver::new(Config::default(), default_registry());
        let err = resolver
            .resolve_for_run(&[DOCUMENT_SERVICE.name()])
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "Resource 'document_service' requires LLAMA_CLOUD_API_KEY to be set"
        );
    }

    #[test]
    fn test_scratch_dir_is_per_run_and_removed() {
        let resolver = ResourceResolver::new(Config::default(), default_registry());

        let first = resolver.for_run();
        let second = resolver.for_run();
        let a = first.get(&SCRATCH_DIR).unwrap();
        let b = second.get(&SCRATCH_DIR).unwrap();
        assert_ne!(a.path(), b.path());

        let path = a.path().to_path_buf();
        assert!(path.exists());
        drop(a);
        drop(first);
        assert!(!path.exists());
    }
}
