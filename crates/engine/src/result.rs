//! Task outcomes and the pipeline failure ledger.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a pipeline run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Not started
    #[default]
    Pending,
    /// Modules are executing
    Running,
    /// Every module completed or was skipped
    Succeeded,
    /// A non-ignored failure or cancellation stopped the run
    Failed,
}

impl Phase {
    /// Whether the run is over
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Running => write!(f, "Running"),
            Self::Succeeded => write!(f, "Succeeded"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Final state of one task run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Every targeted host succeeded (or there were none)
    Succeeded,
    /// At least one host failed
    Failed,
    /// Hosts failed but the task ignores errors
    Ignored,
    /// Every host was gated off
    Skipped,
}

impl TaskStatus {
    /// Whether the module may continue
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed)
    }
}

/// What happened on one host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostOutcome {
    /// Action completed
    Succeeded,
    /// Gate returned false
    Skipped,
    /// Gate or action failed
    Failed {
        /// Error message with task and host context
        error: String,
        /// Captured stdout of the failing command
        stdout: String,
        /// Captured stderr of the failing command
        stderr: String,
    },
}

impl HostOutcome {
    /// Check if the outcome is a failure
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Captured output of one failing host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostFailure {
    /// Host name
    pub host: String,
    /// Standard output
    pub stdout: String,
    /// Standard error (or the error message when nothing was captured)
    pub stderr: String,
}

/// Ledger entry for one failed task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedTask {
    /// Task name
    pub task: String,
    /// Failing hosts
    pub hosts: Vec<HostFailure>,
}

/// Aggregate result of a pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineResult {
    /// Task runs recorded
    pub total: usize,
    /// Task runs that succeeded
    pub succeeded: usize,
    /// Task runs that failed
    pub failed: usize,
    /// Task runs that failed with errors ignored
    pub ignored: usize,
    /// Task runs skipped by their gates
    pub skipped: usize,
    /// Every failed or ignored task with per-host output
    #[serde(default)]
    pub failures: Vec<FailedTask>,
    /// Current phase
    #[serde(default)]
    pub phase: Phase,
    /// Message of the failure that stopped the run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl PipelineResult {
    /// Record one task run
    pub fn record(&mut self, task: &str, status: TaskStatus, failures: Vec<HostFailure>) {
        self.total += 1;
        match status {
            TaskStatus::Succeeded => self.succeeded += 1,
            TaskStatus::Failed => self.failed += 1,
            TaskStatus::Ignored => self.ignored += 1,
            TaskStatus::Skipped => self.skipped += 1,
        }
        if !failures.is_empty() {
            self.failures.push(FailedTask {
                task: task.to_string(),
                hosts: failures,
            });
        }
    }

    /// Mark the run failed, keeping the first reason
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.phase = Phase::Failed;
        if self.reason.is_none() {
            self.reason = Some(reason.into());
        }
    }

    /// Check if the run finished without an aborting failure
    pub fn is_success(&self) -> bool {
        self.phase == Phase::Succeeded
    }
}

impl fmt::Display for PipelineResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} tasks ({} succeeded, {} failed, {} ignored, {} skipped)",
            self.phase, self.total, self.succeeded, self.failed, self.ignored, self.skipped
        )?;
        if let Some(reason) = &self.reason {
            write!(f, "\n  reason: {reason}")?;
        }
        for failure in &self.failures {
            write!(f, "\n  task \"{}\":", failure.task)?;
            for host in &failure.hosts {
                write!(f, "\n    {}: {}", host.host, host.stderr.trim())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_counts_and_ledger() {
        let mut result = PipelineResult::default();
        result.record("a", TaskStatus::Succeeded, Vec::new());
        result.record("b", TaskStatus::Skipped, Vec::new());
        result.record(
            "c",
            TaskStatus::Ignored,
            vec![HostFailure {
                host: "n1".into(),
                stdout: String::new(),
                stderr: "warn".into(),
            }],
        );
        assert_eq!(
            (result.total, result.succeeded, result.skipped, result.ignored),
            (3, 1, 1, 1)
        );
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].task, "c");
    }

    #[test]
    fn test_fail_keeps_first_reason() {
        let mut result = PipelineResult::default();
        result.fail("first");
        result.fail("second");
        assert_eq!(result.phase, Phase::Failed);
        assert_eq!(result.reason.as_deref(), Some("first"));
        assert!(result.phase.is_terminal());
    }

    #[test]
    fn test_display_lists_failures() {
        let mut result = PipelineResult::default();
        result.record(
            "init",
            TaskStatus::Failed,
            vec![HostFailure {
                host: "n2".into(),
                stdout: String::new(),
                stderr: "port 6443 in use\n".into(),
            }],
        );
        result.fail("task \"init\" failed on n2");
        let text = result.to_string();
        assert!(text.starts_with("Failed: 1 tasks (0 succeeded, 1 failed"));
        assert!(text.contains("n2: port 6443 in use"));
    }
}
