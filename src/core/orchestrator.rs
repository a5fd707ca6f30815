//! Main orchestrator for pipeline execution.
//!
//! Drives one start event through a validated [`Pipeline`] until a step
//! produces the terminal event. Every failure mode (resource construction,
//! step error, step timeout, run timeout, wiring problems) is converted into a
//! failed [`Completion`]; callers never see a raw error.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::RunLimits;
use crate::domain::{Completion, ErrorKind, Event, FileSubmitted};

use super::pipeline::{Pipeline, PipelineError, StepContext};
use super::resources::ResourceResolver;
use super::state::StateStore;
use super::stream::{self, EventSink, EventStream};

/// Runs pipelines. Cheap to clone; clones share the pipeline and the
/// process-scoped resources.
#[derive(Clone)]
pub struct Orchestrator {
    pipeline: Arc<Pipeline>,
    resolver: ResourceResolver,
    limits: RunLimits,
}

/// Final completion plus the step that produced it, if any
struct Terminal {
    completion: Completion,
    step: Option<&'static str>,
}

impl Terminal {
    fn engine(completion: Completion) -> Self {
        Self {
            completion,
            step: None,
        }
    }
}

/// A run executing on its own task
pub struct RunHandle {
    pub run_id: Uuid,

    /// Progress events; ends after the terminal event
    pub events: EventStream,

    completion: JoinHandle<Completion>,
}

impl RunHandle {
    /// Wait for the terminal completion
    pub async fn wait(self) -> Completion {
        match self.completion.await {
            Ok(completion) => completion,
            Err(e) => {
                error!(run_id = %self.run_id, error = %e, "Run task aborted");
                Completion::failure(ErrorKind::Internal, format!("Run task aborted: {}", e))
            }
        }
    }
}

impl Orchestrator {
    /// Bind a pipeline to a resolver.
    ///
    /// Fails if a step requires a resource the registry does not know about.
    pub fn new(pipeline: Pipeline, resolver: ResourceResolver) -> Result<Self, PipelineError> {
        for step in pipeline.steps() {
            for resource in step.resources() {
                if !resolver.registry().contains(resource) {
                    return Err(PipelineError::UnknownResource {
                        step: step.name(),
                        resource,
                    });
                }
            }
        }

        let limits = resolver.config().limits.clone();
        Ok(Self {
            pipeline: Arc::new(pipeline),
            resolver,
            limits,
        })
    }

    /// Override the limits taken from configuration
    pub fn with_limits(mut self, limits: RunLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Execute a run without observing progress
    pub async fn run(&self, input: FileSubmitted) -> Completion {
        self.run_with_sink(input, &EventSink::detached()).await
    }

    /// Execute a run, pushing every produced event to `sink`
    pub async fn run_with_sink(&self, input: FileSubmitted, sink: &EventSink) -> Completion {
        self.execute(Uuid::new_v4(), input, sink).await
    }

    /// Execute a run on a new task
    pub fn spawn(&self, input: FileSubmitted) -> RunHandle {
        let run_id = Uuid::new_v4();
        let (sink, events) = stream::channel();
        let orchestrator = self.clone();

        let completion =
            tokio::spawn(async move { orchestrator.execute(run_id, input, &sink).await });

        RunHandle {
            run_id,
            events,
            completion,
        }
    }

    #[instrument(skip(self, input, sink), fields(run_id = %run_id, pipeline = %self.pipeline.name()))]
    async fn execute(&self, run_id: Uuid, input: FileSubmitted, sink: &EventSink) -> Completion {
        info!(file_type = ?input.file_type, inline = input.is_source_content, "Starting run");
        let start = Instant::now();

        let timeout = self.limits.run_timeout();
        let terminal = match tokio::time::timeout(timeout, self.dispatch(run_id, input, sink)).await {
            Ok(terminal) => terminal,
            Err(_) => {
                warn!(timeout_secs = timeout.as_secs(), "Run timed out");
                Terminal::engine(Completion::failure(
                    ErrorKind::Timeout,
                    format!("Run exceeded the {}s time limit", timeout.as_secs()),
                ))
            }
        };
        let completion = terminal.completion.normalized();

        let duration_ms = start.elapsed().as_millis() as u64;
        match completion.outcome() {
            Ok(_) => info!(duration_ms, "Run completed successfully"),
            Err(e) => error!(duration_ms, kind = ?completion.error_kind(), error = %e, "Run failed"),
        }

        sink.emit(run_id, terminal.step, &Event::Completed(completion.clone()));
        completion
    }

    /// Step loop. Run-scoped resources and state are dropped when this returns.
    async fn dispatch(&self, run_id: Uuid, input: FileSubmitted, sink: &EventSink) -> Terminal {
        let resources = match self
            .resolver
            .resolve_for_run(&self.pipeline.required_resources())
        {
            Ok(resources) => resources,
            Err(e) => {
                error!(error = %e, "Resource resolution failed");
                return Terminal::engine(Completion::failure(ErrorKind::Configuration, e.to_string()));
            }
        };

        let state = StateStore::new();
        let ctx = StepContext {
            run_id,
            state: &state,
            resources: &resources,
        };

        let step_timeout = self.limits.step_timeout();
        let mut current = Event::FileSubmitted(input);

        loop {
            let kind = current.kind();
            let Some(step) = self.pipeline.step_for(kind).cloned() else {
                return Terminal::engine(Completion::failure(
                    ErrorKind::Internal,
                    format!("No step accepts event '{}'", kind),
                ));
            };

            debug!(step = step.name(), event = %kind, "Dispatching event");
            let attempt = AssertUnwindSafe(step.run(current, &ctx)).catch_unwind();
            let output = match tokio::time::timeout(step_timeout, attempt).await {
                Ok(Ok(Ok(event))) => event,
                Ok(Ok(Err(e))) => {
                    warn!(step = step.name(), error = %e, "Step failed");
                    return Terminal::engine(Completion::failure(
                        e.kind(),
                        format!("Step '{}' failed: {}", step.name(), e),
                    ));
                }
                Ok(Err(payload)) => {
                    let message = panic_message(payload.as_ref());
                    error!(step = step.name(), panic = %message, "Step panicked");
                    return Terminal::engine(Completion::failure(
                        ErrorKind::Internal,
                        format!("Step '{}' panicked: {}", step.name(), message),
                    ));
                }
                Err(_) => {
                    warn!(step = step.name(), timeout_secs = step_timeout.as_secs(), "Step timed out");
                    return Terminal::engine(Completion::failure(
                        ErrorKind::StepTimeout,
                        format!(
                            "Step '{}' exceeded the {}s time limit",
                            step.name(),
                            step_timeout.as_secs()
                        ),
                    ));
                }
            };

            let emitted = output.kind();
            if !step.emits().contains(&emitted) {
                return Terminal::engine(Completion::failure(
                    ErrorKind::Internal,
                    format!("Step '{}' emitted undeclared event '{}'", step.name(), emitted),
                ));
            }

            match output {
                Event::Completed(completion) => {
                    debug!(step = step.name(), "Terminal event produced");
                    return Terminal {
                        completion,
                        step: Some(step.name()),
                    };
                }
                event => {
                    sink.emit(run_id, Some(step.name()), &event);
                    current = event;
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
