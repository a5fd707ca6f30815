//! folio - Event-driven document analysis pipelines
//!
//! Runs spreadsheets and slide decks through remote AI services (LlamaCloud
//! for document understanding, OpenAI for structured completions) and produces
//! exactly one textual result or typed error per run.
//!
//! # Architecture
//!
//! The engine is a typed event dispatcher:
//! - Each step consumes one event kind and emits the next event
//! - Routing is by event kind, validated when the pipeline is assembled
//! - Per-run state is shared between steps under exclusive access
//! - Clients, prompts and scratch space are injected as scoped resources
//! - Every produced event is streamed to an optional observer
//!
//! # Modules
//!
//! - `adapters`: Remote service clients (LlamaCloud, OpenAI)
//! - `core`: Orchestration engine (Pipeline, Orchestrator, Resources, Retry)
//! - `domain`: Data structures (Event, Completion, RunState, reports)
//! - `pipelines`: The sheets and presentations pipelines
//! - `config`: Configuration loading
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Analyze a portfolio spreadsheet
//! folio run sheets portfolio.xlsx --progress
//!
//! # Classify a deck and extract its details as JSON
//! folio run presentations deck.pdf --json
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod pipelines;

// Re-export main types at crate root for convenience
pub use config::Config;
pub use core::{Orchestrator, RunHandle};
pub use domain::{Completion, ErrorKind, Event, EventKind, FileSubmitted, FileType, RunState};
pub use pipelines::PipelineKind;
