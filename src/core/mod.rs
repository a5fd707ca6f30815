//! Core orchestration logic.
//!
//! This module contains:
//! - Pipeline: Steps and assembly-time validation of the event graph
//! - Orchestrator: Main execution engine
//! - Resources: Lazily built, scoped dependencies injected into steps
//! - Retry: Bounded retry with backoff around remote calls
//! - State: Per-run state store
//! - Stream: Progress events pushed to an observer

pub mod error;
pub mod orchestrator;
pub mod pipeline;
pub mod resources;
pub mod retry;
pub mod state;
pub mod stream;

// Re-export commonly used types
pub use error::{ResourceError, StepError};
pub use orchestrator::{Orchestrator, RunHandle};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineError, Step, StepContext};
pub use resources::{ResourceId, ResourceRegistry, ResourceResolver, RunResources, Scope};
pub use retry::{Backoff, RetryPolicy};
pub use state::{StateGuard, StateStore};
pub use stream::{EventSink, EventStream};
