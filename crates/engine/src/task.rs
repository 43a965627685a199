//! Tasks: one action fanned out over a set of hosts.

use crate::action::{Action, BoxedAction};
use crate::context::{HostContext, RunContext};
use crate::error::{Error, ErrorCategory, Result};
use crate::prepare::{BoxedPrepare, Prepare};
use crate::result::{HostFailure, HostOutcome, TaskStatus};
use crate::retry::{RetryCallback, RetryPolicy, with_retry};
use inventory::{Cache, Inventory, LOCALHOST, vars};
use rayon::prelude::*;
use serde_json::Value;
use std::collections::HashSet;

/// A gated, retryable action over a set of hosts
pub struct Task {
    /// Unique name within the module
    pub name: String,
    /// Human-readable description
    pub desc: String,
    /// Host patterns (host names, groups, `group[i]`, `group | random`)
    pub hosts: Vec<String>,
    /// Run once on the controller instead of on inventory hosts
    pub local: bool,
    /// Gate evaluated once per host before the first attempt
    pub prepare: Option<BoxedPrepare>,
    /// Work to perform
    pub action: BoxedAction,
    /// Fan hosts out concurrently
    pub parallel: bool,
    /// Attempts per host
    pub retry: RetryPolicy,
    /// Record failures without stopping the module
    pub ignore_error: bool,
    /// Run only on the first target host
    pub run_once: bool,
    /// Items to repeat the action over, exposed as `item`: a list whose
    /// strings are rendered, or an expression evaluating to a list
    pub loop_items: Option<Value>,
    /// Expression that turns a completed attempt into a failure
    pub failed_when: Option<String>,
    /// Expression that must hold after an attempt; retried until it does
    pub until: Option<String>,
    /// Labels used to select or skip the task
    pub tags: Vec<String>,
}

impl Task {
    /// Create a serial, non-retrying task with no target hosts
    pub fn new(name: impl Into<String>, action: impl Action + 'static) -> Self {
        Self {
            name: name.into(),
            desc: String::new(),
            hosts: Vec::new(),
            local: false,
            prepare: None,
            action: Box::new(action),
            parallel: false,
            retry: RetryPolicy::none(),
            ignore_error: false,
            run_once: false,
            loop_items: None,
            failed_when: None,
            until: None,
            tags: Vec::new(),
        }
    }

    /// Set the description
    pub fn desc(mut self, desc: impl Into<String>) -> Self {
        self.desc = desc.into();
        self
    }

    /// Target host patterns
    pub fn hosts<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hosts = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Run on the controller
    pub fn local(mut self) -> Self {
        self.local = true;
        self
    }

    /// Gate the task
    pub fn prepare(mut self, prepare: impl Prepare + 'static) -> Self {
        self.prepare = Some(Box::new(prepare));
        self
    }

    /// Fan out concurrently
    pub fn parallel(mut self) -> Self {
        self.parallel = true;
        self
    }

    /// Set the retry policy
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Keep going when hosts fail
    pub fn ignore_error(mut self) -> Self {
        self.ignore_error = true;
        self
    }

    /// Only run on the first target host
    pub fn run_once(mut self) -> Self {
        self.run_once = true;
        self
    }

    /// Repeat the action per item
    pub fn with_loop(mut self, items: impl Into<Value>) -> Self {
        self.loop_items = Some(items.into());
        self
    }

    /// Fail an attempt when `expr` is true
    pub fn failed_when(mut self, expr: impl Into<String>) -> Self {
        self.failed_when = Some(expr.into());
        self
    }

    /// Retry until `expr` is true
    pub fn until(mut self, expr: impl Into<String>) -> Self {
        self.until = Some(expr.into());
        self
    }

    /// Label the task
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Whether tag selection keeps this task.
    ///
    /// `skip` always wins. With no `only` tags every task runs except those
    /// tagged `never`. Otherwise a task runs when it shares a tag with `only`,
    /// is tagged `always`, or `only` contains `all`.
    pub fn is_selected(&self, only: &[String], skip: &[String]) -> bool {
        let tags: HashSet<&str> = self.tags.iter().map(String::as_str).collect();
        if skip.iter().any(|t| tags.contains(t.as_str())) {
            return false;
        }
        if only.is_empty() {
            return !tags.contains("never");
        }
        tags.contains("always")
            || only.iter().any(|t| tags.contains(t.as_str()))
            || (only.iter().any(|t| t == "all") && !tags.contains("never"))
    }

    /// Hosts this task targets, in resolution order
    pub fn target_hosts(&self, inventory: &Inventory) -> Result<Vec<String>> {
        if self.local {
            return Ok(vec![LOCALHOST.to_string()]);
        }
        Ok(inventory.hosts_for(&self.hosts)?)
    }

    /// Run the task, restricted to `batch` when given
    pub(crate) fn run(
        &self,
        rt: &RunContext<'_>,
        module_cache: &Cache,
        batch: Option<&[String]>,
    ) -> TaskReport {
        let hosts = match self.target_hosts(rt.inventory) {
            Ok(hosts) => hosts,
            Err(e) => return TaskReport::aborted(self.wrap(None, e)),
        };
        let mut hosts: Vec<String> = match batch {
            Some(batch) if !self.local => hosts.into_iter().filter(|h| batch.contains(h)).collect(),
            _ => hosts,
        };
        if self.run_once {
            hosts.truncate(1);
        }

        rt.progress.on_task_start(&self.name, hosts.len());
        if hosts.is_empty() {
            log::debug!("Task {}: no target hosts", self.name);
            rt.progress.on_task_complete(&self.name, TaskStatus::Succeeded);
            return TaskReport::succeeded();
        }
        log::info!("Task {}: running on {} host(s)", self.name, hosts.len());

        let results = if self.parallel && hosts.len() > 1 {
            match self.run_parallel(rt, module_cache, &hosts) {
                Ok(results) => results,
                Err(e) => return TaskReport::aborted(e),
            }
        } else {
            self.run_serial(rt, module_cache, &hosts)
        };

        let report = self.summarize(rt, hosts.len(), results);
        rt.progress.on_task_complete(&self.name, report.status);
        report
    }

    /// One host at a time, stopping at the first failure unless errors are ignored
    fn run_serial(
        &self,
        rt: &RunContext<'_>,
        module_cache: &Cache,
        hosts: &[String],
    ) -> Vec<HostResult> {
        let mut results = Vec::with_capacity(hosts.len());
        for index in 0..hosts.len() {
            if rt.cancel.is_cancelled() {
                break;
            }
            let result = self.run_host(rt, module_cache, hosts, index);
            let stop = result.outcome.is_failure()
                && (!self.ignore_error
                    || result
                        .error
                        .as_ref()
                        .is_some_and(|e| e.category() == ErrorCategory::Resolution));
            results.push(result);
            if stop {
                break;
            }
        }
        results
    }

    /// One worker per host on a pool bounded by the run's concurrency
    fn run_parallel(
        &self,
        rt: &RunContext<'_>,
        module_cache: &Cache,
        hosts: &[String],
    ) -> Result<Vec<HostResult>> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(rt.concurrency.min(hosts.len()))
            .build()
            .map_err(|e| Error::Runtime(format!("failed to create thread pool: {e}")))?;

        let results: Vec<Option<HostResult>> = pool.install(|| {
            (0..hosts.len())
                .into_par_iter()
                .map(|index| {
                    if rt.cancel.is_cancelled() {
                        return None;
                    }
                    Some(self.run_host(rt, module_cache, hosts, index))
                })
                .collect()
        });
        Ok(results.into_iter().flatten().collect())
    }

    fn run_host(
        &self,
        rt: &RunContext<'_>,
        module_cache: &Cache,
        hosts: &[String],
        index: usize,
    ) -> HostResult {
        let host = hosts[index].as_str();
        let result = self.attempt(rt, module_cache, hosts, index);

        let outcome = match &result {
            Ok(true) => {
                log::debug!("Task {}: {host} ok", self.name);
                HostOutcome::Succeeded
            }
            Ok(false) => {
                log::debug!("Task {}: {host} skipped", self.name);
                HostOutcome::Skipped
            }
            Err(e) => {
                log::warn!("{e}");
                let (stdout, stderr) = e.output();
                HostOutcome::Failed {
                    error: e.to_string(),
                    stdout,
                    stderr,
                }
            }
        };
        rt.progress.on_host_complete(&self.name, host, &outcome);

        HostResult {
            host: host.to_string(),
            outcome,
            error: result.err(),
        }
    }

    /// Gate then act once per loop item; `Ok(false)` means gated off
    fn attempt(
        &self,
        rt: &RunContext<'_>,
        module_cache: &Cache,
        hosts: &[String],
        index: usize,
    ) -> Result<bool> {
        let host = hosts[index].as_str();
        let wrap = |e: Error| self.wrap(Some(host), e);

        let connector = rt.connector(host, self.local).map_err(wrap)?;
        let vars = rt.host_vars(host).map_err(wrap)?;
        let ctx = HostContext {
            host,
            index,
            hosts,
            connector: connector.as_ref(),
            inventory: rt.inventory,
            vars: &vars,
            pipeline_cache: rt.pipeline_cache,
            module_cache,
            progress: rt.progress,
        };

        if let Some(prepare) = &self.prepare {
            let run = prepare
                .evaluate(&ctx)
                .map_err(|e| wrap(Error::Gate(Box::new(e))))?;
            if !run {
                return Ok(false);
            }
        }

        let Some(items) = self.items(&ctx).map_err(wrap)? else {
            self.execute(&ctx).map_err(wrap)?;
            return Ok(true);
        };
        log::debug!("Task {}: {host} looping over {} item(s)", self.name, items.len());
        for item in items {
            let mut item_vars = vars.clone();
            vars::set(&mut item_vars, "item", item);
            let item_ctx = HostContext {
                vars: &item_vars,
                ..ctx
            };
            self.execute(&item_ctx).map_err(wrap)?;
        }
        Ok(true)
    }

    /// Loop items for this host, `None` when the task does not loop
    fn items(&self, ctx: &HostContext<'_>) -> Result<Option<Vec<Value>>> {
        let value = match &self.loop_items {
            None => return Ok(None),
            Some(Value::String(expr)) => ctx.eval_value(expr)?,
            Some(Value::Array(items)) => {
                let rendered = items
                    .iter()
                    .map(|item| ctx.render_value(item))
                    .collect::<Result<_>>()?;
                return Ok(Some(rendered));
            }
            Some(other) => other.clone(),
        };
        match value {
            Value::Array(items) => Ok(Some(items)),
            other => Err(Error::Runtime(format!("loop must be a list, got {other}"))),
        }
    }

    /// Run the action with retries, checking `failed_when` and `until` after each attempt
    fn execute(&self, ctx: &HostContext<'_>) -> Result<()> {
        let logger: &dyn RetryCallback = &RetryLog {
            task: &self.name,
            host: ctx.host,
        };
        with_retry(&self.retry, Some(logger), |_| {
            self.action.execute(ctx)?;
            if let Some(expr) = &self.failed_when
                && ctx.eval(expr)?
            {
                return Err(Error::action(format!("failed_when condition met: {expr}")));
            }
            if let Some(expr) = &self.until
                && !ctx.eval(expr)?
            {
                return Err(Error::action(format!("until condition not met: {expr}")));
            }
            Ok(())
        })
    }

    fn wrap(&self, host: Option<&str>, source: Error) -> Error {
        Error::TaskFailed {
            task: self.name.clone(),
            host: host.unwrap_or("-").to_string(),
            source: Box::new(source),
        }
    }

    fn summarize(&self, rt: &RunContext<'_>, targeted: usize, results: Vec<HostResult>) -> TaskReport {
        let completed = results.len();
        let mut failures = Vec::new();
        let mut skipped = 0;
        let mut first_error = None;
        let mut unresolved = false;

        for result in results {
            match result.outcome {
                HostOutcome::Succeeded => {}
                HostOutcome::Skipped => skipped += 1,
                HostOutcome::Failed { stdout, stderr, .. } => failures.push(HostFailure {
                    host: result.host,
                    stdout,
                    stderr,
                }),
            }
            if let Some(error) = result.error {
                unresolved |= error.category() == ErrorCategory::Resolution;
                first_error.get_or_insert(error);
            }
        }

        let (status, error) = if !failures.is_empty() {
            if self.ignore_error && !unresolved {
                log::warn!("Task {}: {} host(s) failed, ignoring", self.name, failures.len());
                (TaskStatus::Ignored, None)
            } else {
                (TaskStatus::Failed, first_error)
            }
        } else if completed < targeted && rt.cancel.is_cancelled() {
            (TaskStatus::Failed, Some(Error::Cancelled))
        } else if skipped == targeted {
            (TaskStatus::Skipped, None)
        } else {
            (TaskStatus::Succeeded, None)
        };

        TaskReport {
            status,
            failures,
            error,
        }
    }
}

/// Outcome of one host worker
struct HostResult {
    host: String,
    outcome: HostOutcome,
    error: Option<Error>,
}

/// Outcome of one task run
pub(crate) struct TaskReport {
    pub status: TaskStatus,
    pub failures: Vec<HostFailure>,
    /// Error that stops the module, when the status is `Failed`
    pub error: Option<Error>,
}

impl TaskReport {
    fn succeeded() -> Self {
        Self {
            status: TaskStatus::Succeeded,
            failures: Vec::new(),
            error: None,
        }
    }

    /// Failed before any host ran; the ledger entry carries the error under host `-`
    fn aborted(error: Error) -> Self {
        let (stdout, stderr) = error.output();
        Self {
            status: TaskStatus::Failed,
            failures: vec![HostFailure {
                host: "-".to_string(),
                stdout,
                stderr,
            }],
            error: Some(error),
        }
    }
}

struct RetryLog<'a> {
    task: &'a str,
    host: &'a str,
}

impl RetryCallback for RetryLog<'_> {
    fn on_retry(&self, attempt: u32, max_attempts: u32, error: &Error) {
        log::warn!(
            "Task {} on {}: attempt {attempt}/{max_attempts} failed: {error}, retrying",
            self.task,
            self.host
        );
    }
}
