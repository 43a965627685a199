//! Error types for pipeline execution.
//!
//! Errors are categorized so the runtime can decide whether an attempt is
//! worth repeating and how a failure should be reported.

use crate::context::Scope;
use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of engine errors for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// A gate could not be evaluated
    Precondition,
    /// The action itself failed (command exited non-zero, copy failed)
    Action,
    /// Inputs could not be resolved (bad serial spec, missing cache entry, template)
    Resolution,
    /// The host could not be reached
    Connector,
    /// The run was cancelled
    Cancelled,
}

impl ErrorCategory {
    /// Whether another attempt might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Action | Self::Connector)
    }
}

/// Errors raised while running pipelines.
#[derive(Debug, Error)]
pub enum Error {
    /// A serial entry is not a positive count or percentage
    #[error("invalid serial entry {entry}: {reason}")]
    InvalidSerial {
        /// The offending entry as written
        entry: String,
        /// What is wrong with it
        reason: &'static str,
    },

    /// A required cache entry is missing
    #[error("{scope} cache has no entry \"{key}\"")]
    CacheMiss {
        /// Cache scope that was searched
        scope: Scope,
        /// Missing key
        key: String,
    },

    /// A template could not be rendered
    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),

    /// The action reported failure without a connector error
    #[error("{message}")]
    ActionFailed {
        /// Failure message
        message: String,
    },

    /// A gate returned an error instead of a decision
    #[error("gate failed: {0}")]
    Gate(Box<Error>),

    /// A task failed on a host
    #[error("task \"{task}\" failed on {host}: {source}")]
    TaskFailed {
        /// Task name
        task: String,
        /// Host name
        host: String,
        /// Root cause
        source: Box<Error>,
    },

    /// The run was cancelled before this work was dispatched
    #[error("pipeline cancelled")]
    Cancelled,

    /// Worker infrastructure failed
    #[error("runtime error: {0}")]
    Runtime(String),

    /// Host inventory lookup failed
    #[error(transparent)]
    Inventory(#[from] inventory::Error),

    /// Connector error
    #[error(transparent)]
    Connector(#[from] connector::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Classify the error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidSerial { .. }
            | Self::CacheMiss { .. }
            | Self::Template(_)
            | Self::Runtime(_)
            | Self::Inventory(_)
            | Self::Json(_) => ErrorCategory::Resolution,
            Self::ActionFailed { .. } | Self::Io(_) => ErrorCategory::Action,
            // a gate that reads a missing cache entry is an input problem
            Self::Gate(inner) => match inner.category() {
                ErrorCategory::Resolution => ErrorCategory::Resolution,
                _ => ErrorCategory::Precondition,
            },
            Self::TaskFailed { source, .. } => source.category(),
            Self::Cancelled => ErrorCategory::Cancelled,
            Self::Connector(e) if e.is_transport() => ErrorCategory::Connector,
            Self::Connector(
                connector::Error::Inventory(_) | connector::Error::HostKeyMismatch { .. },
            ) => ErrorCategory::Resolution,
            Self::Connector(_) => ErrorCategory::Action,
        }
    }

    /// Whether another attempt might succeed.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Shorthand for an action failure
    pub fn action(message: impl Into<String>) -> Self {
        Self::ActionFailed {
            message: message.into(),
        }
    }

    /// Captured stdout/stderr of the command behind this error, if any
    pub fn output(&self) -> (String, String) {
        match self {
            Self::Connector(e) => e
                .output()
                .map(|(out, err)| (out.to_string(), err.to_string()))
                .unwrap_or_else(|| (String::new(), e.to_string())),
            Self::TaskFailed { source, .. } | Self::Gate(source) => source.output(),
            other => (String::new(), other.to_string()),
        }
    }
}
