//! Progress reporting hooks.

use crate::result::{HostOutcome, TaskStatus};

/// Progress callback for pipeline execution.
///
/// Parallel host workers report through the same instance, so
/// implementations must synchronize internally.
pub trait ProgressCallback: Send + Sync {
    /// A module is about to run its tasks
    fn on_module_start(&self, module: &str, index: usize, total: usize);

    /// A module was skipped by its condition
    fn on_module_skip(&self, module: &str);

    /// A task is about to dispatch to `hosts` hosts
    fn on_task_start(&self, task: &str, hosts: usize);

    /// One host finished (or was gated off)
    fn on_host_complete(&self, task: &str, host: &str, outcome: &HostOutcome);

    /// A task finished
    fn on_task_complete(&self, task: &str, status: TaskStatus);

    /// An action printed a message for `host` (debug output)
    fn on_message(&self, host: &str, message: &str);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_module_start(&self, _module: &str, _index: usize, _total: usize) {}
    fn on_module_skip(&self, _module: &str) {}
    fn on_task_start(&self, _task: &str, _hosts: usize) {}
    fn on_host_complete(&self, _task: &str, _host: &str, _outcome: &HostOutcome) {}
    fn on_task_complete(&self, _task: &str, _status: TaskStatus) {}
    fn on_message(&self, _host: &str, _message: &str) {}
}
