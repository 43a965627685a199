//! Modules: ordered tasks forming one logical step.

use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::serial::{self, SerialEntry};
use crate::task::{Task, TaskReport};
use inventory::{Cache, Inventory, vars};
use serde_json::Value;
use std::collections::HashSet;

/// Condition evaluated once before a module runs; `true` skips the module
pub trait SkipWhen: Send + Sync {
    /// Decide whether to skip
    fn should_skip(&self, inventory: &Inventory, pipeline_cache: &Cache) -> Result<bool>;
}

/// Skip when a group resolves to no hosts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupEmpty(pub String);

impl SkipWhen for GroupEmpty {
    fn should_skip(&self, inventory: &Inventory, _pipeline_cache: &Cache) -> Result<bool> {
        Ok(inventory.resolve_group(&self.0).is_empty())
    }
}

/// Skip when an inventory-level variable equals a value
#[derive(Debug, Clone, PartialEq)]
pub struct InventoryVarEquals {
    /// Dotted path into inventory vars
    pub path: String,
    /// Value that triggers the skip
    pub value: Value,
}

impl SkipWhen for InventoryVarEquals {
    fn should_skip(&self, inventory: &Inventory, _pipeline_cache: &Cache) -> Result<bool> {
        Ok(vars::lookup(inventory.vars(), &self.path) == Some(&self.value))
    }
}

/// Skip when a pipeline cache entry equals a value
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineCacheEquals {
    /// Cache key
    pub key: String,
    /// Value that triggers the skip
    pub value: Value,
}

impl SkipWhen for PipelineCacheEquals {
    fn should_skip(&self, _inventory: &Inventory, pipeline_cache: &Cache) -> Result<bool> {
        Ok(pipeline_cache.get(&self.key).as_ref() == Some(&self.value))
    }
}

/// Skip condition backed by a closure
pub struct FnSkip<F>(F);

/// Wrap a closure as a [`SkipWhen`] condition
pub fn skip_fn<F>(f: F) -> FnSkip<F>
where
    F: Fn(&Inventory, &Cache) -> Result<bool> + Send + Sync,
{
    FnSkip(f)
}

impl<F> SkipWhen for FnSkip<F>
where
    F: Fn(&Inventory, &Cache) -> Result<bool> + Send + Sync,
{
    fn should_skip(&self, inventory: &Inventory, pipeline_cache: &Cache) -> Result<bool> {
        (self.0)(inventory, pipeline_cache)
    }
}

/// An ordered list of tasks with an optional skip condition and rollout waves.
///
/// When a task fails, the `rescue` tasks run and the module still fails.
/// The `always` tasks run after the others whatever the outcome.
pub struct Module {
    /// Module name
    pub name: String,
    /// Human-readable description
    pub desc: String,
    /// Tasks in execution order
    pub tasks: Vec<Task>,
    /// Run after a failing task
    pub rescue: Vec<Task>,
    /// Run last, on success or failure
    pub always: Vec<Task>,
    /// Evaluated once before any task
    pub skip: Option<Box<dyn SkipWhen>>,
    /// Rollout waves; empty runs every host at once
    pub serial: Vec<SerialEntry>,
}

impl Module {
    /// Create an empty module
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            desc: String::new(),
            tasks: Vec::new(),
            rescue: Vec::new(),
            always: Vec::new(),
            skip: None,
            serial: Vec::new(),
        }
    }

    /// Set the description
    pub fn desc(mut self, desc: impl Into<String>) -> Self {
        self.desc = desc.into();
        self
    }

    /// Append a task
    pub fn task(mut self, task: Task) -> Self {
        self.tasks.push(task);
        self
    }

    /// Append a rescue task
    pub fn rescue(mut self, task: Task) -> Self {
        self.rescue.push(task);
        self
    }

    /// Append an always task
    pub fn always(mut self, task: Task) -> Self {
        self.always.push(task);
        self
    }

    /// Every task in run order: main, rescue, always
    pub fn all_tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().chain(&self.rescue).chain(&self.always)
    }

    /// Drop tasks that tag selection filters out
    pub fn retain_tags(&mut self, only: &[String], skip: &[String]) {
        for list in [&mut self.tasks, &mut self.rescue, &mut self.always] {
            list.retain(|task| task.is_selected(only, skip));
        }
    }

    /// Set the skip condition
    pub fn skip_when(mut self, condition: impl SkipWhen + 'static) -> Self {
        self.skip = Some(Box::new(condition));
        self
    }

    /// Roll out in waves
    pub fn serial(mut self, serial: Vec<SerialEntry>) -> Self {
        self.serial = serial;
        self
    }

    /// Whether the skip condition holds
    pub fn is_skip(&self, inventory: &Inventory, pipeline_cache: &Cache) -> Result<bool> {
        match &self.skip {
            Some(condition) => condition.should_skip(inventory, pipeline_cache),
            None => Ok(false),
        }
    }

    /// Union of every remote task's hosts, in first-seen order
    pub fn union_hosts(&self, inventory: &Inventory) -> Result<Vec<String>> {
        let mut seen = HashSet::new();
        let mut union = Vec::new();
        for task in self.all_tasks().filter(|t| !t.local) {
            for host in task.target_hosts(inventory)? {
                if seen.insert(host.clone()) {
                    union.push(host);
                }
            }
        }
        Ok(union)
    }

    /// Run the module. An error aborts the pipeline.
    pub(crate) fn run(&self, rt: &RunContext<'_>) -> Result<()> {
        if self.is_skip(rt.inventory, rt.pipeline_cache)? {
            log::info!("Module {}: skipped", self.name);
            rt.progress.on_module_skip(&self.name);
            return Ok(());
        }

        let module_cache = Cache::new();
        if self.serial.is_empty() {
            return self.run_block(rt, &module_cache, None);
        }

        let hosts = self.union_hosts(rt.inventory)?;
        if hosts.is_empty() {
            return self.run_block(rt, &module_cache, Some(&[]));
        }
        let batches = serial::batch(&hosts, &self.serial)?;
        for (index, batch) in batches.iter().enumerate() {
            log::info!(
                "Module {}: batch {}/{} ({})",
                self.name,
                index + 1,
                batches.len(),
                batch.join(", ")
            );
            self.run_block(rt, &module_cache, Some(batch))?;
        }
        Ok(())
    }

    /// Main tasks, rescue on failure, then always
    fn run_block(&self, rt: &RunContext<'_>, module_cache: &Cache, batch: Option<&[String]>) -> Result<()> {
        let mut outcome = Self::run_tasks(&self.tasks, rt, module_cache, batch);
        if let Err(e) = &outcome
            && !self.rescue.is_empty()
            && !matches!(e, Error::Cancelled)
        {
            log::warn!("Module {}: running {} rescue task(s) after: {e}", self.name, self.rescue.len());
            if let Err(rescue_err) = Self::run_tasks(&self.rescue, rt, module_cache, batch) {
                log::error!("Module {}: rescue failed: {rescue_err}", self.name);
            }
        }
        if !self.always.is_empty() {
            let always = Self::run_tasks(&self.always, rt, module_cache, batch);
            outcome = outcome.and(always);
        }
        outcome
    }

    fn run_tasks(tasks: &[Task], rt: &RunContext<'_>, module_cache: &Cache, batch: Option<&[String]>) -> Result<()> {
        for task in tasks {
            rt.cancel.check()?;
            let TaskReport {
                status,
                failures,
                error,
            } = task.run(rt, module_cache, batch);
            rt.record(&task.name, status, failures);

            if !status.is_success() {
                return Err(error.unwrap_or_else(|| Error::action(format!("task \"{}\" failed", task.name))));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Command;
    use inventory::Group;
    use serde_json::json;

    fn fleet() -> Inventory {
        let mut inv = Inventory::new();
        for host in ["cp1", "cp2", "w1"] {
            inv.add_host(host, json!({}));
        }
        inv.add_group("control", Group::with_hosts(["cp1", "cp2"]));
        inv.add_group("workers", Group::with_hosts(["w1", "cp2"]));
        inv.vars_mut()["upgrade"] = json!({"enabled": false});
        inv
    }

    #[test]
    fn test_union_hosts_ignores_local_tasks() {
        let module = Module::new("upgrade")
            .task(Task::new("drain", Command::new("drain")).hosts(["workers"]))
            .task(Task::new("render", Command::new("render")).hosts(["control"]).local())
            .task(Task::new("upgrade", Command::new("upgrade")).hosts(["control"]));

        assert_eq!(module.union_hosts(&fleet()).unwrap(), vec!["w1", "cp2", "cp1"]);
    }

    #[test]
    fn test_skip_conditions() {
        let inv = fleet();
        let cache = Cache::new();
        cache.set("done", true);

        assert!(!Module::new("m").is_skip(&inv, &cache).unwrap());
        assert!(GroupEmpty("etcd".into()).should_skip(&inv, &cache).unwrap());
        assert!(!GroupEmpty("workers".into()).should_skip(&inv, &cache).unwrap());

        let disabled = InventoryVarEquals {
            path: "upgrade.enabled".into(),
            value: json!(false),
        };
        assert!(disabled.should_skip(&inv, &cache).unwrap());

        let done = PipelineCacheEquals {
            key: "done".into(),
            value: json!(true),
        };
        assert!(Module::new("m").skip_when(done).is_skip(&inv, &cache).unwrap());

        let custom = skip_fn(|inv: &Inventory, _: &Cache| Ok(inv.host_names().len() > 2));
        assert!(custom.should_skip(&inv, &cache).unwrap());
    }
}
