//! What a gate or action sees while working on one host.

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::progress::ProgressCallback;
use crate::result::{HostFailure, PipelineResult, TaskStatus};
use connector::{Connector, ConnectorFactory};
use inventory::{Cache, Inventory, LOCALHOST, vars};
use minijinja::{Environment, ErrorKind, UndefinedBehavior};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Lifetime of a cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Whole pipeline run
    Pipeline,
    /// One module run
    Module,
    /// The host (lives with the inventory)
    Host,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pipeline => write!(f, "pipeline"),
            Self::Module => write!(f, "module"),
            Self::Host => write!(f, "host"),
        }
    }
}

/// Per-host view handed to [`Prepare`](crate::Prepare) and
/// [`Action`](crate::Action) implementations.
pub struct HostContext<'a> {
    /// Host being worked on
    pub host: &'a str,
    /// Position of the host in the task's host list
    pub index: usize,
    /// All hosts of the task (or of the current batch)
    pub hosts: &'a [String],
    /// Transport to the host
    pub connector: &'a dyn Connector,
    /// Read-only inventory
    pub inventory: &'a Inventory,
    /// Effective host variables
    pub vars: &'a Value,
    /// Pipeline-scope cache
    pub pipeline_cache: &'a Cache,
    /// Module-scope cache
    pub module_cache: &'a Cache,
    /// Where debug output goes
    pub progress: &'a dyn ProgressCallback,
}

impl HostContext<'_> {
    /// Cache for a scope
    pub fn cache(&self, scope: Scope) -> &Cache {
        match scope {
            Scope::Pipeline => self.pipeline_cache,
            Scope::Module => self.module_cache,
            Scope::Host => self.connector.cache(),
        }
    }

    /// Read a cache entry that must exist
    pub fn require(&self, scope: Scope, key: &str) -> Result<Value> {
        self.cache(scope).get(key).ok_or_else(|| Error::CacheMiss {
            scope,
            key: key.to_string(),
        })
    }

    /// Whether this host is the first of the task's hosts
    pub fn is_first(&self) -> bool {
        self.index == 0
    }

    /// Declared groups containing this host
    pub fn roles(&self) -> Vec<String> {
        self.inventory.roles(self.host)
    }

    /// Report a message for this host
    pub fn message(&self, message: &str) {
        log::info!("[{}] {message}", self.host);
        self.progress.on_message(self.host, message);
    }

    /// Host variables plus the cache scopes as `facts`, `module` and `pipeline`
    fn template_data(&self) -> Value {
        let mut data = self.vars.clone();
        if let Value::Object(map) = &mut data {
            map.insert("facts".into(), self.connector.cache().snapshot());
            map.insert("module".into(), self.module_cache.snapshot());
            map.insert("pipeline".into(), self.pipeline_cache.snapshot());
        }
        data
    }

    /// Render a template against host variables and caches.
    ///
    /// Host variables are top-level names; cache scopes are reachable as
    /// `facts`, `module` and `pipeline`. Undefined names are errors.
    pub fn render(&self, template: &str) -> Result<String> {
        if !has_template_syntax(template) {
            return Ok(template.to_string());
        }
        Ok(strict_env().render_str(template, self.template_data())?)
    }

    /// Evaluate a bare expression (`facts.out.rc == 0`) to a JSON value
    pub fn eval_value(&self, expr: &str) -> Result<Value> {
        Ok(serde_json::to_value(self.eval_raw(expr)?)?)
    }

    /// Evaluate a condition; the result follows template truthiness
    pub fn eval(&self, expr: &str) -> Result<bool> {
        Ok(self.eval_raw(expr)?.is_true())
    }

    fn eval_raw(&self, expr: &str) -> Result<minijinja::Value> {
        let env = strict_env();
        let value = env
            .compile_expression(strip_braces(expr))?
            .eval(self.template_data())?;
        if value.is_undefined() {
            return Err(minijinja::Error::new(
                ErrorKind::UndefinedError,
                format!("`{}` is undefined", strip_braces(expr)),
            )
            .into());
        }
        Ok(value)
    }

    /// Render every string inside a JSON document
    pub fn render_value(&self, value: &Value) -> Result<Value> {
        Ok(match value {
            Value::String(s) => Value::String(self.render(s)?),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.render_value(item))
                    .collect::<Result<_>>()?,
            ),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| Ok::<_, Error>((k.clone(), self.render_value(v)?)))
                    .collect::<Result<_>>()?,
            ),
            other => other.clone(),
        })
    }
}

/// Check if a string contains template syntax
pub fn has_template_syntax(s: &str) -> bool {
    s.contains("{{") || s.contains("{%")
}

/// Accept `{{ expr }}` wherever a bare expression is expected
fn strip_braces(expr: &str) -> &str {
    let trimmed = expr.trim();
    trimmed
        .strip_prefix("{{")
        .and_then(|rest| rest.strip_suffix("}}"))
        .map_or(trimmed, str::trim)
}

fn strict_env() -> Environment<'static> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env
}

/// Everything shared by the tasks of one pipeline run
pub(crate) struct RunContext<'a> {
    pub inventory: &'a Inventory,
    pub factory: &'a dyn ConnectorFactory,
    pub progress: &'a dyn ProgressCallback,
    pub cancel: &'a CancelToken,
    pub pipeline_cache: &'a Cache,
    pub concurrency: usize,
    status: &'a Mutex<PipelineResult>,
    connections: Mutex<HashMap<String, Arc<dyn Connector>>>,
}

impl<'a> RunContext<'a> {
    pub fn new(
        inventory: &'a Inventory,
        factory: &'a dyn ConnectorFactory,
        progress: &'a dyn ProgressCallback,
        cancel: &'a CancelToken,
        pipeline_cache: &'a Cache,
        concurrency: usize,
        status: &'a Mutex<PipelineResult>,
    ) -> Self {
        Self {
            inventory,
            factory,
            progress,
            cancel,
            pipeline_cache,
            concurrency: concurrency.max(1),
            status,
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Connector for a host, created once per run
    pub fn connector(&self, host: &str, local: bool) -> Result<Arc<dyn Connector>> {
        let key = if local { format!("{LOCALHOST}@controller") } else { host.to_string() };
        if let Some(existing) = self.lock_connections().get(&key) {
            return Ok(Arc::clone(existing));
        }

        // connect outside the lock; the first connector stored wins
        let created = if local {
            self.factory.local()
        } else {
            self.factory.connect(self.inventory, host)?
        };
        let mut connections = self.lock_connections();
        Ok(Arc::clone(connections.entry(key).or_insert(created)))
    }

    fn lock_connections(&self) -> MutexGuard<'_, HashMap<String, Arc<dyn Connector>>> {
        self.connections.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Effective variables of a host; the controller gets inventory vars
    pub fn host_vars(&self, host: &str) -> Result<Value> {
        if self.inventory.contains_host(host) {
            return Ok(self.inventory.host_vars(host)?);
        }
        let mut merged = vars::combine([self.inventory.vars()]);
        for key in ["inventory_name", "hostname"] {
            vars::set(&mut merged, key, Value::String(host.to_string()));
        }
        Ok(merged)
    }

    /// Record a task run in the shared result
    pub fn record(&self, task: &str, status: TaskStatus, failures: Vec<HostFailure>) {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(task, status, failures);
    }
}
