//! Error types for inventory operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for inventory operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading, querying or mutating an inventory.
#[derive(Debug, Error)]
pub enum Error {
    /// A dotted variable path did not resolve to a value
    #[error("key not found: {path}")]
    KeyNotFound {
        /// The full dotted path that was requested
        path: String,
    },

    /// A variable exists but holds a value of the wrong shape
    #[error("variable \"{path}\" is not {expected}")]
    TypeMismatch {
        /// The dotted path of the variable
        path: String,
        /// Human-readable name of the expected type
        expected: &'static str,
    },

    /// A host name is not part of the inventory
    #[error("unknown host: {0}")]
    UnknownHost(String),

    /// An indexed host pattern (`group[i]`) pointed past the end of the group
    #[error("index {index} out of range for group {group} ({len} hosts)")]
    IndexOutOfRange {
        /// Group being indexed
        group: String,
        /// Requested index
        index: usize,
        /// Number of resolved hosts in the group
        len: usize,
    },

    /// The inventory document is structurally invalid
    #[error("invalid inventory: {0}")]
    Invalid(String),

    /// Inventory file has an extension we cannot parse
    #[error("unsupported inventory format: {0}")]
    UnsupportedFormat(PathBuf),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Shorthand for a missing dotted path.
    pub fn key_not_found(path: impl Into<String>) -> Self {
        Self::KeyNotFound { path: path.into() }
    }
}
