//! Error types for connector operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for connector operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while reaching or driving a host.
#[derive(Debug, Error)]
pub enum Error {
    /// The command could not be started at all
    #[error("failed to execute \"{program}\": {source}")]
    Spawn {
        /// Program that failed to start
        program: String,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// The command ran and exited non-zero
    #[error("command failed on {host} (exit {code:?}): {}", .stderr.trim())]
    CommandFailed {
        /// Host the command ran on
        host: String,
        /// Exit code, if the process exited normally
        code: Option<i32>,
        /// Captured standard output
        stdout: String,
        /// Captured standard error
        stderr: String,
    },

    /// The transport to the host failed (unreachable, timeout, broken pipe)
    #[error("cannot reach {host}: {message}")]
    Transport {
        /// Target host
        host: String,
        /// Transport error text
        message: String,
    },

    /// The SSH session failed after the TCP connection was up
    #[error("ssh session to {host} failed: {source}")]
    Session {
        /// Target host
        host: String,
        /// libssh2 error
        source: ssh2::Error,
    },

    /// The server presented a key that differs from the recorded one
    #[error("host key for {host} does not match {}", .known_hosts.display())]
    HostKeyMismatch {
        /// Target host
        host: String,
        /// File holding the recorded key
        known_hosts: PathBuf,
    },

    /// The host rejected our credentials
    #[error("authentication failed for {user}@{host}")]
    Authentication {
        /// Target host
        host: String,
        /// Login user
        user: String,
    },

    /// A file transfer failed
    #[error("copy {} -> {destination} failed on {host}: {message}", .source_path.display())]
    Copy {
        /// Target host
        host: String,
        /// Source path
        source_path: PathBuf,
        /// Destination path
        destination: String,
        /// Failure details
        message: String,
    },

    /// Host or connection settings could not be resolved
    #[error(transparent)]
    Inventory(#[from] inventory::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the failure happened below the command (network, session, auth)
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::Session { .. } | Self::Authentication { .. }
        )
    }

    /// Captured stdout/stderr when the error came from a finished command
    pub fn output(&self) -> Option<(&str, &str)> {
        match self {
            Self::CommandFailed { stdout, stderr, .. } => Some((stdout, stderr)),
            _ => None,
        }
    }
}
