//! Configuration for folio.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (LLAMA_CLOUD_API_KEY, OPENAI_API_KEY, FOLIO_LLM_MODEL)
//! 2. Config file (explicit path, $FOLIO_CONFIG, .folio/config.yaml, user config dir)
//! 3. Defaults
//!
//! Config file discovery:
//! - Searches current directory and parents for .folio/config.yaml
//! - Falls back to <user config dir>/folio/config.yaml
//!
//! Credentials are not validated here. Missing keys surface when the resource
//! that needs them is built, as a configuration error for the run.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::retry::RetryPolicy;

pub const DEFAULT_LLAMA_CLOUD_URL: &str = "https://api.cloud.llamaindex.ai";
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_LLM_MODEL: &str = "gpt-4.1";

const LLAMA_CLOUD_KEY_VAR: &str = "LLAMA_CLOUD_API_KEY";
const OPENAI_KEY_VAR: &str = "OPENAI_API_KEY";
const LLM_MODEL_VAR: &str = "FOLIO_LLM_MODEL";
const CONFIG_PATH_VAR: &str = "FOLIO_CONFIG";

/// Resolved configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llama_cloud: LlamaCloudConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    /// Retry policy for flaky remote calls
    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub limits: RunLimits,

    /// Path to config file (if found)
    #[serde(skip)]
    pub config_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlamaCloudConfig {
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    #[serde(default = "default_llama_cloud_url")]
    pub base_url: String,

    /// Delay between job status checks (default: 1000ms)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for LlamaCloudConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_llama_cloud_url(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default = "default_openai_url")]
    pub base_url: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_llm_model(),
            base_url: default_openai_url(),
        }
    }
}

/// Time and size limits applied to every run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLimits {
    /// Total run timeout in seconds (default: 600 = 10 min)
    #[serde(default = "default_run_timeout")]
    pub run_timeout_seconds: u64,

    /// Per-step timeout in seconds (default: 300 = 5 min)
    #[serde(default = "default_step_timeout")]
    pub step_timeout_seconds: u64,

    /// Maximum decoded size of inline content (default: 50MB)
    #[serde(default = "default_max_inline_bytes")]
    pub max_inline_bytes: u64,

    /// Maximum size of a document read from a path (default: 50MB)
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

fn default_llama_cloud_url() -> String {
    DEFAULT_LLAMA_CLOUD_URL.to_string()
}
fn default_openai_url() -> String {
    DEFAULT_OPENAI_URL.to_string()
}
fn default_llm_model() -> String {
    DEFAULT_LLM_MODEL.to_string()
}
fn default_run_timeout() -> u64 {
    600
} // 10 min
fn default_step_timeout() -> u64 {
    300
} // 5 min
fn default_max_inline_bytes() -> u64 {
    50 * 1024 * 1024
} // 50MB
fn default_max_file_bytes() -> u64 {
    50 * 1024 * 1024
} // 50MB

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            run_timeout_seconds: default_run_timeout(),
            step_timeout_seconds: default_step_timeout(),
            max_inline_bytes: default_max_inline_bytes(),
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

impl RunLimits {
    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_seconds)
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_seconds)
    }
}

impl Config {
    /// Load configuration from all sources
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let config_file = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => std::env::var_os(CONFIG_PATH_VAR)
                .map(PathBuf::from)
                .or_else(find_config_file),
        };

        let mut config = match config_file {
            Some(ref path) => {
                let mut config = Self::from_file(path)?;
                config.config_file = Some(path.clone());
                config
            }
            None => Self::default(),
        };

        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Load a config file without applying environment overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse config YAML")
    }

    /// Apply environment overrides through a lookup function
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        self.llama_cloud.api_key =
            resolve_secret(self.llama_cloud.api_key.take(), LLAMA_CLOUD_KEY_VAR, &lookup);
        self.llm.api_key = resolve_secret(self.llm.api_key.take(), OPENAI_KEY_VAR, &lookup);

        if let Some(model) = lookup(LLM_MODEL_VAR).filter(|m| !m.is_empty()) {
            self.llm.model = model;
        }
    }
}

/// Pick a credential: environment first, then a literal value from the file.
///
/// A file value of `$VAR` (or empty) defers to the environment.
fn resolve_secret<F>(from_file: Option<String>, var: &str, lookup: &F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    let placeholder = format!("${}", var);
    let from_file = from_file.filter(|value| !value.is_empty() && *value != placeholder);

    lookup(var).filter(|value| !value.is_empty()).or(from_file)
}

/// Find config file by searching current directory and parents, then the
/// user config directory
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".folio").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    dirs::config_dir()
        .map(|dir| dir.join("folio").join("config.yaml"))
        .filter(|path| path.exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::retry::Backoff;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.llm.model, "gpt-4.1");
        assert_eq!(config.llama_cloud.base_url, DEFAULT_LLAMA_CLOUD_URL);
        assert_eq!(config.limits.run_timeout_seconds, 600);
        assert_eq!(config.limits.max_file_bytes, 50 * 1024 * 1024);
        assert_eq!(config.llama_cloud.poll_interval_ms, 1000);
        assert_eq!(config.retry.max_retries, 3);
        assert!(config.llm.api_key.is_none());
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
llama_cloud:
  api_key: llx-file
  poll_interval_ms: 250
llm:
  api_key: $OPENAI_API_KEY
  model: gpt-4o-mini
retry:
  max_retries: 5
  backoff: exponential
limits:
  run_timeout_seconds: 120
"#
        )
        .unwrap();

        let config = Config::from_file(&config_path).unwrap();
        assert_eq!(config.llama_cloud.api_key.as_deref(), Some("llx-file"));
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.llm.base_url, DEFAULT_OPENAI_URL);
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.backoff, Backoff::Exponential);
        assert_eq!(config.limits.run_timeout_seconds, 120);
        assert_eq!(config.limits.step_timeout_seconds, 300);
        assert_eq!(config.limits.max_file_bytes, 50 * 1024 * 1024);
        assert_eq!(config.llama_cloud.poll_interval_ms, 250);
    }

    #[test]
    fn test_placeholder_defers_to_environment() {
        let mut config =
            Config::from_yaml("llm:\n  api_key: $OPENAI_API_KEY\n").unwrap();

        config.apply_env(env(&[("OPENAI_API_KEY", "sk-env")]));
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-env"));

        let mut config =
            Config::from_yaml("llm:\n  api_key: $OPENAI_API_KEY\n").unwrap();
        config.apply_env(env(&[]));
        assert!(config.llm.api_key.is_none());
    }

    #[test]
    fn test_environment_overrides_file() {
        let mut config = Config::from_yaml("llama_cloud:\n  api_key: llx-file\n").unwrap();
        config.apply_env(env(&[
            ("LLAMA_CLOUD_API_KEY", "llx-env"),
            ("FOLIO_LLM_MODEL", "gpt-4o"),
        ]));

        assert_eq!(config.llama_cloud.api_key.as_deref(), Some("llx-env"));
        assert_eq!(config.llm.model, "gpt-4o");
    }

    #[test]
    fn test_secrets_are_not_serialized() {
        let mut config = Config::default();
        config.llm.api_key = Some("sk-secret".to_string());

        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(!yaml.contains("sk-secret"));
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        let result = Config::load(Some(&temp.path().join("missing.yaml")));
        assert!(result.is_err());
    }
}
