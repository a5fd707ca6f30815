//! Domain types for the folio pipelines.
//!
//! This module contains the core data structures:
//! - Events: Messages passed between steps, including the terminal completion
//! - Run: Per-run state shared between steps
//! - Reports: Structured records returned by the remote services

pub mod events;
pub mod reports;
pub mod run;

// Re-export commonly used types
pub use events::{
    Classified, Completion, ErrorKind, Event, EventKind, FileSubmitted, FileType, FileUploaded,
    SheetParsed, StreamedEvent, TablesRendered,
};
pub use reports::{
    BoardUpdateDeck, FinancialSummary, InvestmentSheetAnalysis, ManagementPresentation,
    PresentationKind,
};
pub use run::{ChatHistory, ChatMessage, Role, RunState};
