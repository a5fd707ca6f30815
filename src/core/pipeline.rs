//! Pipeline definitions and assembly-time validation.
//!
//! A pipeline is a set of steps, each consuming exactly one event kind and
//! declaring the kinds it may emit. Routing is by event kind alone, so the
//! builder rejects anything that would make dispatch ambiguous or unable to
//! finish:
//! - two steps accepting the same kind
//! - no step accepting the start kind
//! - an emitted non-terminal kind nobody accepts
//! - a step accepting the terminal kind
//! - a cycle between kinds reachable from the start

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use super::error::StepError;
use super::resources::RunResources;
use super::state::StateStore;
use crate::domain::{Event, EventKind};

/// Everything a step may touch besides its input event
pub struct StepContext<'a> {
    pub run_id: Uuid,
    pub state: &'a StateStore,
    pub resources: &'a RunResources,
}

/// A unit of work in a pipeline
#[async_trait]
pub trait Step: Send + Sync {
    /// Step name (used in logs, stream envelopes and error messages)
    fn name(&self) -> &'static str;

    /// The single event kind this step consumes
    fn accepts(&self) -> EventKind;

    /// Event kinds this step may produce
    fn emits(&self) -> &'static [EventKind];

    /// Resources that must resolve before the run starts
    fn resources(&self) -> &'static [&'static str] {
        &[]
    }

    async fn run(&self, event: Event, ctx: &StepContext<'_>) -> Result<Event, StepError>;
}

/// Assembly errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("Pipeline '{0}' has no steps")]
    Empty(String),

    #[error("Steps '{first}' and '{second}' both accept '{kind}'")]
    DuplicateAcceptor {
        kind: EventKind,
        first: &'static str,
        second: &'static str,
    },

    #[error("No step accepts the start event")]
    MissingStart,

    #[error("Step '{step}' emits '{kind}' but no step accepts it")]
    MissingAcceptor { step: &'static str, kind: EventKind },

    #[error("Step '{0}' accepts the terminal event")]
    TerminalAcceptor(&'static str),

    #[error("Event '{0}' can reach itself; pipelines must be acyclic")]
    Cycle(EventKind),

    #[error("Step '{step}' requires unregistered resource '{resource}'")]
    UnknownResource {
        step: &'static str,
        resource: &'static str,
    },
}

/// A validated, immutable pipeline
pub struct Pipeline {
    name: String,
    steps: Vec<Arc<dyn Step>>,
    by_kind: HashMap<EventKind, Arc<dyn Step>>,
}

impl Pipeline {
    pub fn builder(name: impl Into<String>) -> PipelineBuilder {
        PipelineBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The unique step for an event kind
    pub fn step_for(&self, kind: EventKind) -> Option<&Arc<dyn Step>> {
        self.by_kind.get(&kind)
    }

    /// Steps in declaration order
    pub fn steps(&self) -> impl Iterator<Item = &Arc<dyn Step>> {
        self.steps.iter()
    }

    /// Resources declared by all steps, deduplicated, in declaration order
    pub fn required_resources(&self) -> Vec<&'static str> {
        let mut seen = HashSet::new();
        self.steps
            .iter()
            .flat_map(|step| step.resources().iter().copied())
            .filter(|name| seen.insert(*name))
            .collect()
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let steps: Vec<_> = self.steps.iter().map(|s| s.name()).collect();
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("steps", &steps)
            .finish()
    }
}

/// Collects steps and validates the resulting graph
pub struct PipelineBuilder {
    name: String,
    steps: Vec<Arc<dyn Step>>,
}

impl PipelineBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    pub fn step(mut self, step: impl Step + 'static) -> Self {
        self.steps.push(Arc::new(step));
        self
    }

    pub fn shared_step(mut self, step: Arc<dyn Step>) -> Self {
        self.steps.push(step);
        self
    }

    pub fn build(self) -> Result<Pipeline, PipelineError> {
        if self.steps.is_empty() {
            return Err(PipelineError::Empty(self.name));
        }

        let mut by_kind: HashMap<EventKind, Arc<dyn Step>> = HashMap::new();
        for step in &self.steps {
            let kind = step.accepts();
            if kind.is_terminal() {
                return Err(PipelineError::TerminalAcceptor(step.name()));
            }
            if let Some(existing) = by_kind.get(&kind) {
                return Err(PipelineError::DuplicateAcceptor {
                    kind,
                    first: existing.name(),
                    second: step.name(),
                });
            }
            by_kind.insert(kind, Arc::clone(step));
        }

        if !by_kind.contains_key(&EventKind::FileSubmitted) {
            return Err(PipelineError::MissingStart);
        }

        for step in &self.steps {
            for kind in step.emits() {
                if !kind.is_terminal() && !by_kind.contains_key(kind) {
                    return Err(PipelineError::MissingAcceptor {
                        step: step.name(),
                        kind: *kind,
                    });
                }
            }
        }

        check_acyclic(&by_kind)?;

        Ok(Pipeline {
            name: self.name,
            steps: self.steps,
            by_kind,
        })
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

fn check_acyclic(by_kind: &HashMap<EventKind, Arc<dyn Step>>) -> Result<(), PipelineError> {
    fn visit(
        kind: EventKind,
        by_kind: &HashMap<EventKind, Arc<dyn Step>>,
        marks: &mut HashMap<EventKind, Mark>,
    ) -> Result<(), PipelineError> {
        match marks.get(&kind) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => return Err(PipelineError::Cycle(kind)),
            None => {}
        }

        marks.insert(kind, Mark::Visiting);
        if let Some(step) = by_kind.get(&kind) {
            for next in step.emits().iter().filter(|k| !k.is_terminal()) {
                visit(*next, by_kind, marks)?;
            }
        }
        marks.insert(kind, Mark::Done);
        Ok(())
    }

    let mut marks = HashMap::new();
    visit(EventKind::FileSubmitted, by_kind, &mut marks)
}
