//! Error types raised inside the engine.
//!
//! None of these cross the run boundary: the orchestrator converts them into a
//! failed [`Completion`](crate::domain::Completion) tagged with an [`ErrorKind`].

use thiserror::Error;

use crate::adapters::ServiceError;
use crate::domain::{ErrorKind, EventKind};

/// A resource could not be resolved
#[derive(Debug, Clone, Error)]
pub enum ResourceError {
    #[error("Resource '{resource}' requires {variable} to be set")]
    MissingCredential {
        resource: &'static str,
        variable: &'static str,
    },

    #[error("Resource '{0}' is not registered")]
    Unregistered(String),

    #[error("Resource '{0}' was registered with a different type")]
    TypeMismatch(String),

    #[error("Failed to build resource '{resource}': {message}")]
    Build {
        resource: &'static str,
        message: String,
    },
}

/// A step failed without producing an event
#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("{0}")]
    DataContract(String),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("Step '{step}' cannot handle event '{kind}'")]
    UnexpectedEvent { step: &'static str, kind: EventKind },

    #[error("Run state has no {0}")]
    MissingState(&'static str),

    #[error("Blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl StepError {
    pub fn data_contract(message: impl Into<String>) -> Self {
        Self::DataContract(message.into())
    }

    /// Category reported on the terminal completion
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Service(e) => e.kind(),
            Self::DataContract(_) => ErrorKind::DataContract,
            Self::Resource(_) => ErrorKind::Configuration,
            Self::Io(_)
            | Self::Template(_)
            | Self::UnexpectedEvent { .. }
            | Self::MissingState(_)
            | Self::Join(_) => ErrorKind::Internal,
        }
    }
}
