//! Event types flowing between pipeline steps.
//!
//! Every run starts from exactly one [`FileSubmitted`] event and ends with
//! exactly one [`Completion`]. Everything in between is an intermediate event
//! produced by a step and consumed by the next one.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::reports::PresentationKind;

/// A message passed between steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Start event carrying the raw input
    FileSubmitted(FileSubmitted),

    /// The document was uploaded to the document service
    FileUploaded(FileUploaded),

    /// A presentation was classified
    Classified(Classified),

    /// A spreadsheet was parsed into downloadable table regions
    SheetParsed(SheetParsed),

    /// Table regions were rendered as markdown
    TablesRendered(TablesRendered),

    /// Terminal event
    Completed(Completion),
}

impl Event {
    /// Discriminant of this event
    pub fn kind(&self) -> EventKind {
        match self {
            Self::FileSubmitted(_) => EventKind::FileSubmitted,
            Self::FileUploaded(_) => EventKind::FileUploaded,
            Self::Classified(_) => EventKind::Classified,
            Self::SheetParsed(_) => EventKind::SheetParsed,
            Self::TablesRendered(_) => EventKind::TablesRendered,
            Self::Completed(_) => EventKind::Completed,
        }
    }

    /// Whether this event ends a run
    pub fn is_terminal(&self) -> bool {
        self.kind().is_terminal()
    }
}

impl From<Completion> for Event {
    fn from(completion: Completion) -> Self {
        Self::Completed(completion)
    }
}

/// Discriminant of an [`Event`], used as the dispatch key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    FileSubmitted,
    FileUploaded,
    Classified,
    SheetParsed,
    TablesRendered,
    Completed,
}

impl EventKind {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed)
    }

    pub fn is_start(self) -> bool {
        matches!(self, Self::FileSubmitted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::FileSubmitted => "file_submitted",
            Self::FileUploaded => "file_uploaded",
            Self::Classified => "classified",
            Self::SheetParsed => "sheet_parsed",
            Self::TablesRendered => "tables_rendered",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of document submitted to a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    Spreadsheet,
    SlideDeck,
}

impl FileType {
    /// Extension assumed when the caller did not provide one
    pub fn default_extension(self) -> &'static str {
        match self {
            Self::Spreadsheet => ".xlsx",
            Self::SlideDeck => ".pdf",
        }
    }
}

/// Start event.
///
/// `source` is a local path when `is_source_content` is false, and base64
/// encoded document bytes when it is true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSubmitted {
    pub source: String,

    pub is_source_content: bool,

    /// Display file name (inline content only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,

    /// Extension including the leading dot, e.g. ".xlsx"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_extension: Option<String>,

    pub file_type: FileType,
}

impl FileSubmitted {
    /// Input referencing a document already on disk
    pub fn from_path(path: impl Into<PathBuf>, file_type: FileType) -> Self {
        Self {
            source: path.into().to_string_lossy().into_owned(),
            is_source_content: false,
            file_name: None,
            file_extension: None,
            file_type,
        }
    }

    /// Input carrying base64 encoded document bytes
    pub fn inline(content_base64: impl Into<String>, file_type: FileType) -> Self {
        Self {
            source: content_base64.into(),
            is_source_content: true,
            file_name: None,
            file_extension: None,
            file_type,
        }
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.file_extension = Some(extension.into());
        self
    }

    /// Extension to use for inline content
    pub fn extension(&self) -> &str {
        self.file_extension
            .as_deref()
            .unwrap_or_else(|| self.file_type.default_extension())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUploaded {
    pub file_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classified {
    pub category: PresentationKind,
    pub reasons: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetParsed {
    pub job_id: String,

    /// Downloaded table files, in region order
    pub table_files: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TablesRendered {
    pub markdown_tables: Vec<String>,
}

/// Category of a failed run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A resource could not be constructed (e.g. missing credential)
    Configuration,

    /// A remote service call failed
    Remote,

    /// A response or input did not have the expected shape
    DataContract,

    /// A remote call succeeded but produced nothing usable
    NoResult,

    /// The run exceeded its wall-clock budget
    Timeout,

    /// A single step exceeded its budget
    StepTimeout,

    /// Engine or pipeline wiring problem
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Remote => "remote",
            Self::DataContract => "data_contract",
            Self::NoResult => "no_result",
            Self::Timeout => "timeout",
            Self::StepTimeout => "step_timeout",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal event payload.
///
/// Exactly one of `final_result` and `error` is set when built through
/// [`Completion::success`] or [`Completion::failure`]. Consumers should go
/// through [`Completion::outcome`], which treats a populated error as
/// authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    final_result: Option<String>,
    error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_kind: Option<ErrorKind>,
}

impl Completion {
    pub fn success(result: impl Into<String>) -> Self {
        Self {
            final_result: Some(result.into()),
            error: None,
            error_kind: None,
        }
    }

    pub fn failure(kind: ErrorKind, error: impl Into<String>) -> Self {
        Self {
            final_result: None,
            error: Some(error.into()),
            error_kind: Some(kind),
        }
    }

    /// `Ok(result)` or `Err(error)`; the error wins if both are present
    pub fn outcome(&self) -> Result<&str, &str> {
        match (&self.error, &self.final_result) {
            (Some(error), _) => Err(error),
            (None, Some(result)) => Ok(result),
            (None, None) => Err(""),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome().is_ok()
    }

    pub fn final_result(&self) -> Option<&str> {
        self.outcome().ok()
    }

    pub fn error(&self) -> Option<&str> {
        self.outcome().err()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        if self.is_success() {
            None
        } else {
            Some(self.error_kind.unwrap_or(ErrorKind::Internal))
        }
    }

    /// Enforce the output contract: exactly one non-empty field.
    pub fn normalized(self) -> Self {
        match self.outcome() {
            Ok(result) if result.trim().is_empty() => {
                Self::failure(ErrorKind::DataContract, "Pipeline produced an empty result")
            }
            Ok(result) => Self::success(result),
            Err(error) if error.trim().is_empty() => {
                Self::failure(ErrorKind::Internal, "Run failed without an error description")
            }
            Err(error) => {
                Self::failure(self.error_kind.unwrap_or(ErrorKind::Internal), error)
            }
        }
    }
}

/// Envelope pushed to the event stream for every produced event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamedEvent {
    /// The run this event belongs to
    pub run_id: Uuid,

    /// Position in the run's stream, starting at 0
    pub sequence: u64,

    /// When the event was pushed
    pub timestamp: DateTime<Utc>,

    /// Step that produced the event. None for terminals the engine
    /// synthesized: step errors, panics, timeouts and configuration failures.
    pub step: Option<String>,

    pub event: Event,
}
