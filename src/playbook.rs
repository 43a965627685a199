//! Playbook files: modules and tasks as data
//!
//! A playbook is YAML, JSON or TOML (by extension). Actions, gates and skip
//! conditions are tagged by `type` and map onto the engine's built-ins.
//!
//! ```yaml
//! name: bootstrap
//! modules:
//!   - name: control-plane
//!     serial: [1, "50%"]
//!     tasks:
//!       - name: init
//!         hosts: [kube_control_plane]
//!         when: { type: first_host }
//!         action: { type: command, cmd: "kubeadm init", sudo: true, register: init }
//!         failed_when: "'error' in facts.init.stderr"
//!     rescue:
//!       - name: reset
//!         hosts: [kube_control_plane]
//!         action: { type: command, cmd: "kubeadm reset -f", sudo: true }
//! ```

use anyhow::{Context, Result, bail};
use engine::action::{
    Assert, Command, CopyTo, DebugMessage, FetchFrom, GatherFacts, IncludeVars, SetFact, Template,
};
use engine::module::{GroupEmpty, InventoryVarEquals, PipelineCacheEquals};
use engine::prepare::{
    self, Always, CacheEquals, Condition, FileExists, FirstHost, HasRole, VarEquals,
};
use engine::{BoxedAction, BoxedPrepare, Module, Pipeline, RetryPolicy, Scope, SerialEntry, SkipWhen, Task};
use inventory::Inventory;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playbook {
    pub name: String,
    #[serde(default)]
    pub modules: Vec<ModuleSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleSpec {
    pub name: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_when: Option<SkipSpec>,
    /// Rollout waves: counts or `"N%"` strings
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub serial: Vec<SerialEntry>,
    /// Inherited by every task of the module
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub tasks: Vec<TaskSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rescue: Vec<TaskSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub always: Vec<TaskSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub name: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default)]
    pub local: bool,
    #[serde(default)]
    pub parallel: bool,
    /// Extra attempts; the configured default applies when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_delay_ms: Option<u64>,
    #[serde(default)]
    pub ignore_error: bool,
    #[serde(default)]
    pub run_once: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<WhenSpec>,
    /// A list, or an expression evaluating to one
    #[serde(default, rename = "loop", skip_serializing_if = "Option::is_none")]
    pub loop_items: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_when: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub action: ActionSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionSpec {
    Command {
        cmd: String,
        #[serde(default)]
        sudo: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        register: Option<String>,
    },
    CopyTo {
        src: String,
        dest: String,
    },
    FetchFrom {
        src: String,
        dest: String,
    },
    SetFact {
        scope: Scope,
        key: String,
        value: Value,
    },
    GatherFacts,
    Assert {
        that: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fail_msg: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        success_msg: Option<String>,
    },
    /// Exactly one of `msg` and `var`
    Debug {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        msg: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        var: Option<String>,
    },
    Template {
        src: String,
        dest: String,
    },
    IncludeVars {
        file: String,
        #[serde(default = "host_scope")]
        scope: Scope,
    },
}

const fn host_scope() -> Scope {
    Scope::Host
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WhenSpec {
    Always,
    FileExists { path: String },
    FileMissing { path: String },
    CacheEquals { scope: Scope, key: String, value: Value },
    FirstHost,
    HasRole { role: String },
    LacksRole { role: String },
    VarEquals { path: String, value: Value },
    Expr { expr: String },
    All { conditions: Vec<WhenSpec> },
    Any { conditions: Vec<WhenSpec> },
    Not { condition: Box<WhenSpec> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SkipSpec {
    GroupEmpty { group: String },
    VarEquals { path: String, value: Value },
    CacheEquals { key: String, value: Value },
}

impl Playbook {
    /// Load a playbook, choosing the format from the extension
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read playbook: {}", path.display()))?;
        let playbook: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => serde_yaml::from_str(&content)
                .with_context(|| format!("Invalid YAML playbook: {}", path.display()))?,
            Some("json") => serde_json::from_str(&content)
                .with_context(|| format!("Invalid JSON playbook: {}", path.display()))?,
            Some("toml") => toml::from_str(&content)
                .with_context(|| format!("Invalid TOML playbook: {}", path.display()))?,
            _ => bail!(
                "Unsupported playbook format: {} (expected .yaml, .yml, .json or .toml)",
                path.display()
            ),
        };
        log::debug!(
            "Loaded playbook {} ({} modules)",
            playbook.name,
            playbook.modules.len()
        );
        Ok(playbook)
    }

    /// Structural checks against the inventory the playbook will run on
    pub fn validate(&self, inventory: &Inventory) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("playbook name must not be empty");
        }

        let mut modules = HashSet::new();
        for module in &self.modules {
            if module.name.trim().is_empty() {
                bail!("playbook {}: module name must not be empty", self.name);
            }
            if !modules.insert(module.name.as_str()) {
                bail!("playbook {}: duplicate module \"{}\"", self.name, module.name);
            }
            module.validate(inventory)?;
        }
        Ok(())
    }

    /// Build the runnable pipeline; `defaults` applies to tasks without retries
    pub fn to_pipeline(&self, defaults: &RetryPolicy) -> Pipeline {
        self.modules
            .iter()
            .fold(Pipeline::new(&self.name), |pipeline, module| {
                pipeline.module(module.to_module(defaults))
            })
    }

    /// Total task count across modules, rescue and always tasks included
    pub fn task_count(&self) -> usize {
        self.modules.iter().map(|m| m.all_tasks().count()).sum()
    }
}

impl ModuleSpec {
    fn all_tasks(&self) -> impl Iterator<Item = &TaskSpec> {
        self.tasks.iter().chain(&self.rescue).chain(&self.always)
    }

    fn validate(&self, inventory: &Inventory) -> Result<()> {
        let mut tasks = HashSet::new();
        for task in self.all_tasks() {
            if task.name.trim().is_empty() {
                bail!("module {}: task name must not be empty", self.name);
            }
            if !tasks.insert(task.name.as_str()) {
                bail!("module {}: duplicate task \"{}\"", self.name, task.name);
            }
            if !task.local {
                if task.hosts.is_empty() {
                    bail!("module {}: task {} has no hosts", self.name, task.name);
                }
                if let Some(unknown) = task.hosts.iter().find(|p| !inventory.is_known_pattern(p)) {
                    bail!(
                        "module {}: task {} targets unknown host or group \"{unknown}\"",
                        self.name,
                        task.name
                    );
                }
            }
            task.action
                .validate()
                .with_context(|| format!("module {}: task {}", self.name, task.name))?;
        }

        if !self.serial.is_empty() {
            let mut hosts = Vec::new();
            for task in self.all_tasks().filter(|t| !t.local) {
                hosts.extend(
                    inventory
                        .hosts_for(&task.hosts)
                        .with_context(|| format!("module {}: task {}", self.name, task.name))?,
                );
            }
            if !hosts.is_empty() {
                engine::serial::batch(&hosts, &self.serial)
                    .with_context(|| format!("module {}: invalid serial", self.name))?;
            }
        }
        Ok(())
    }

    fn to_module(&self, defaults: &RetryPolicy) -> Module {
        let build = |specs: &[TaskSpec]| -> Vec<Task> {
            specs.iter().map(|task| task.to_task(defaults, &self.tags)).collect()
        };
        let mut module = Module::new(&self.name)
            .desc(&self.desc)
            .serial(self.serial.clone());
        module.skip = self.skip_when.as_ref().map(SkipSpec::to_condition);
        module.tasks = build(&self.tasks);
        module.rescue = build(&self.rescue);
        module.always = build(&self.always);
        module
    }
}

impl TaskSpec {
    fn to_task(&self, defaults: &RetryPolicy, inherited_tags: &[String]) -> Task {
        let retry = RetryPolicy::new(
            self.retries.unwrap_or(defaults.retries),
            self.retry_delay_ms
                .map_or(defaults.delay, Duration::from_millis),
        );

        Task {
            name: self.name.clone(),
            desc: self.desc.clone(),
            hosts: self.hosts.clone(),
            local: self.local,
            prepare: self.when.as_ref().map(WhenSpec::to_prepare),
            action: self.action.to_action(),
            parallel: self.parallel,
            retry,
            ignore_error: self.ignore_error,
            run_once: self.run_once,
            loop_items: self.loop_items.clone(),
            failed_when: self.failed_when.clone(),
            until: self.until.clone(),
            tags: inherited_tags.iter().chain(&self.tags).cloned().collect(),
        }
    }
}

impl ActionSpec {
    fn to_action(&self) -> BoxedAction {
        match self.clone() {
            Self::Command { cmd, sudo, register } => Box::new(Command { cmd, sudo, register }),
            Self::CopyTo { src, dest } => Box::new(CopyTo { src, dest }),
            Self::FetchFrom { src, dest } => Box::new(FetchFrom { src, dest }),
            Self::SetFact { scope, key, value } => Box::new(SetFact { scope, key, value }),
            Self::GatherFacts => Box::new(GatherFacts),
            Self::Assert {
                that,
                fail_msg,
                success_msg,
            } => Box::new(Assert {
                that,
                fail_msg,
                success_msg,
            }),
            Self::Debug { msg, var } => match var {
                Some(var) => Box::new(DebugMessage::Var(var)),
                None => Box::new(DebugMessage::Msg(msg.unwrap_or_default())),
            },
            Self::Template { src, dest } => Box::new(Template { src, dest }),
            Self::IncludeVars { file, scope } => Box::new(IncludeVars { file, scope }),
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            Self::Assert { that, .. } if that.is_empty() => {
                bail!("assert needs at least one condition")
            }
            Self::Debug { msg, var } if msg.is_some() == var.is_some() => {
                bail!("debug takes exactly one of msg and var")
            }
            _ => Ok(()),
        }
    }
}

impl WhenSpec {
    fn to_prepare(&self) -> BoxedPrepare {
        match self.clone() {
            Self::Always => Box::new(Always),
            Self::FileExists { path } => Box::new(FileExists { path, negate: false }),
            Self::FileMissing { path } => Box::new(FileExists { path, negate: true }),
            Self::CacheEquals { scope, key, value } => Box::new(CacheEquals { scope, key, value }),
            Self::FirstHost => Box::new(FirstHost),
            Self::HasRole { role } => Box::new(HasRole { role, negate: false }),
            Self::LacksRole { role } => Box::new(HasRole { role, negate: true }),
            Self::VarEquals { path, value } => Box::new(VarEquals { path, value }),
            Self::Expr { expr } => Box::new(Condition(expr)),
            Self::All { conditions } => {
                Box::new(prepare::All(conditions.iter().map(Self::to_prepare).collect()))
            }
            Self::Any { conditions } => {
                Box::new(prepare::Any(conditions.iter().map(Self::to_prepare).collect()))
            }
            Self::Not { condition } => Box::new(prepare::Not(condition.to_prepare())),
        }
    }
}

impl SkipSpec {
    fn to_condition(&self) -> Box<dyn SkipWhen> {
        match self.clone() {
            Self::GroupEmpty { group } => Box::new(GroupEmpty(group)),
            Self::VarEquals { path, value } => Box::new(InventoryVarEquals { path, value }),
            Self::CacheEquals { key, value } => Box::new(PipelineCacheEquals { key, value }),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
