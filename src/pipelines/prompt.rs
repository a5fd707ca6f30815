//! Prompt templates rendered with minijinja.

use minijinja::{context, Environment};

/// Prompt asking for an analysis of the rendered portfolio tables
pub const ANALYSIS_PROMPT: &str = "Your task is to analyze the trends and performance of an \
investment portfolio (and possibly come up with improvement suggestions) based on these \
tables:\n\n{{tables}}\n\n";

/// Immutable prompt template, shared across runs
pub struct PromptTemplate {
    env: Environment<'static>,
    source: String,
}

impl PromptTemplate {
    /// Compile `source`, failing on syntax errors
    pub fn new(source: impl Into<String>) -> Result<Self, minijinja::Error> {
        let source = source.into();
        let env = Environment::new();
        env.template_from_str(&source)?;
        Ok(Self { env, source })
    }

    pub fn analysis() -> Result<Self, minijinja::Error> {
        Self::new(ANALYSIS_PROMPT)
    }

    /// Render with the given tables text
    pub fn render(&self, tables: &str) -> Result<String, minijinja::Error> {
        self.env.render_str(&self.source, context! { tables })
    }
}

impl std::fmt::Debug for PromptTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptTemplate")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}
