//! Actions: the work a task performs on each host.

use crate::context::{HostContext, Scope};
use crate::error::{Error, Result};
use connector::CommandOutput;
use serde_json::{Value, json};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Anything that can execute against a host.
///
/// Called once per attempt; failures are retried by the task according to
/// its retry policy.
pub trait Action: Send + Sync {
    /// Short human-readable summary
    fn describe(&self) -> String;

    /// Run against the host in `ctx`
    fn execute(&self, ctx: &HostContext<'_>) -> Result<()>;
}

/// Boxed action
pub type BoxedAction = Box<dyn Action>;

impl fmt::Debug for dyn Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Action({})", self.describe())
    }
}

// ============================================================================
// Built-in actions
// ============================================================================

/// Run a templated shell command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Command template
    pub cmd: String,
    /// Run through sudo
    pub sudo: bool,
    /// Host cache key receiving `{stdout, stderr, rc}`
    pub register: Option<String>,
}

impl Command {
    /// A plain command
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            sudo: false,
            register: None,
        }
    }

    /// Elevate with sudo
    pub fn sudo(mut self) -> Self {
        self.sudo = true;
        self
    }

    /// Store the command's output in the host cache under `key`
    pub fn register(mut self, key: impl Into<String>) -> Self {
        self.register = Some(key.into());
        self
    }
}

impl Action for Command {
    fn describe(&self) -> String {
        format!("command: {}", self.cmd)
    }

    fn execute(&self, ctx: &HostContext<'_>) -> Result<()> {
        let cmd = ctx.render(&self.cmd)?;
        let output = ctx.connector.run_command(&cmd, self.sudo)?;
        if let Some(key) = &self.register {
            ctx.connector.cache().set(key.clone(), registered(&output));
        }
        if output.success() {
            return Ok(());
        }
        Err(connector::Error::CommandFailed {
            host: ctx.host.to_string(),
            code: output.code,
            stdout: output.stdout,
            stderr: output.stderr,
        }
        .into())
    }
}

/// Registered form of a command's output. Output that parses as JSON is
/// stored parsed; anything else is stored as trimmed text.
fn registered(output: &CommandOutput) -> Value {
    let parse = |text: &str| {
        let text = text.trim();
        serde_json::from_str::<Value>(text).unwrap_or_else(|_| Value::String(text.to_string()))
    };
    json!({
        "stdout": parse(&output.stdout),
        "stderr": parse(&output.stderr),
        "rc": output.code,
    })
}

/// Copy a controller file to the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyTo {
    /// Local source path template
    pub src: String,
    /// Remote destination path template
    pub dest: String,
}

impl Action for CopyTo {
    fn describe(&self) -> String {
        format!("copy {} -> {}", self.src, self.dest)
    }

    fn execute(&self, ctx: &HostContext<'_>) -> Result<()> {
        let src = PathBuf::from(ctx.render(&self.src)?);
        let dest = ctx.render(&self.dest)?;
        ctx.connector.copy_to(&src, &dest)?;
        Ok(())
    }
}

/// Copy a host file back to the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFrom {
    /// Remote source path template
    pub src: String,
    /// Local destination path template (usually per-host)
    pub dest: String,
}

impl Action for FetchFrom {
    fn describe(&self) -> String {
        format!("fetch {} -> {}", self.src, self.dest)
    }

    fn execute(&self, ctx: &HostContext<'_>) -> Result<()> {
        let src = ctx.render(&self.src)?;
        let dest = PathBuf::from(ctx.render(&self.dest)?);
        ctx.connector.fetch_from(&src, &dest)?;
        Ok(())
    }
}

/// Write a value into a cache; strings inside are rendered first
#[derive(Debug, Clone, PartialEq)]
pub struct SetFact {
    /// Target cache
    pub scope: Scope,
    /// Cache key
    pub key: String,
    /// Value (templated)
    pub value: Value,
}

impl Action for SetFact {
    fn describe(&self) -> String {
        format!("set {} fact {}", self.scope, self.key)
    }

    fn execute(&self, ctx: &HostContext<'_>) -> Result<()> {
        let value = ctx.render_value(&self.value)?;
        ctx.cache(self.scope).set(self.key.clone(), value);
        Ok(())
    }
}

/// Collect OS facts into the host cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatherFacts;

impl Action for GatherFacts {
    fn describe(&self) -> String {
        "gather facts".to_string()
    }

    fn execute(&self, ctx: &HostContext<'_>) -> Result<()> {
        connector::gather_facts(ctx.connector)?;
        Ok(())
    }
}

/// Fail unless every condition holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assert {
    /// Expressions that must all be true
    pub that: Vec<String>,
    /// Message template used when a condition is false
    pub fail_msg: Option<String>,
    /// Message template reported when every condition holds
    pub success_msg: Option<String>,
}

impl Action for Assert {
    fn describe(&self) -> String {
        format!("assert {}", self.that.join(" and "))
    }

    fn execute(&self, ctx: &HostContext<'_>) -> Result<()> {
        for condition in &self.that {
            if !ctx.eval(condition)? {
                let message = match &self.fail_msg {
                    Some(msg) => ctx.render(msg)?,
                    None => format!("assertion failed: {condition}"),
                };
                return Err(Error::action(message));
            }
        }
        if let Some(msg) = &self.success_msg {
            ctx.message(&ctx.render(msg)?);
        }
        Ok(())
    }
}

/// Print a rendered message, or the value of a variable expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugMessage {
    /// Message template
    Msg(String),
    /// Expression whose value is printed as JSON
    Var(String),
}

impl Action for DebugMessage {
    fn describe(&self) -> String {
        match self {
            Self::Msg(msg) => format!("debug: {msg}"),
            Self::Var(var) => format!("debug var: {var}"),
        }
    }

    fn execute(&self, ctx: &HostContext<'_>) -> Result<()> {
        let text = match self {
            Self::Msg(msg) => ctx.render(msg)?,
            Self::Var(var) => format!("{var} = {}", ctx.eval_value(var)?),
        };
        ctx.message(&text);
        Ok(())
    }
}

/// Render a controller-side template file and copy the result to the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    /// Local template path (the path itself may be templated)
    pub src: String,
    /// Remote destination path template
    pub dest: String,
}

impl Action for Template {
    fn describe(&self) -> String {
        format!("template {} -> {}", self.src, self.dest)
    }

    fn execute(&self, ctx: &HostContext<'_>) -> Result<()> {
        let src = PathBuf::from(ctx.render(&self.src)?);
        let dest = ctx.render(&self.dest)?;
        let content = ctx.render(&fs::read_to_string(&src)?)?;

        let mut rendered = tempfile::NamedTempFile::new()?;
        rendered.write_all(content.as_bytes())?;
        rendered.flush()?;
        ctx.connector.copy_to(rendered.path(), &dest)?;
        log::debug!("[{}] rendered {} -> {dest}", ctx.host, src.display());
        Ok(())
    }
}

/// Load a YAML or JSON mapping from the controller into a cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeVars {
    /// File path template
    pub file: String,
    /// Cache receiving the top-level keys
    pub scope: Scope,
}

impl Action for IncludeVars {
    fn describe(&self) -> String {
        format!("include vars {} into {} cache", self.file, self.scope)
    }

    fn execute(&self, ctx: &HostContext<'_>) -> Result<()> {
        let path = PathBuf::from(ctx.render(&self.file)?);
        let vars = load_vars(&path)?;
        let cache = ctx.cache(self.scope);
        for (key, value) in vars {
            cache.set(key, value);
        }
        Ok(())
    }
}

fn load_vars(path: &Path) -> Result<serde_json::Map<String, Value>> {
    let content = fs::read_to_string(path)?;
    let value: Value = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&content)?,
        _ => serde_yaml::from_str(&content)
            .map_err(|e| Error::Runtime(format!("{}: {e}", path.display())))?,
    };
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(serde_json::Map::new()),
        other => Err(Error::Runtime(format!(
            "{}: expected a mapping, found {other}",
            path.display()
        ))),
    }
}

/// Action backed by a closure
pub struct FnAction<F> {
    name: String,
    f: F,
}

/// Wrap a closure as an [`Action`]
pub fn from_fn<F>(name: impl Into<String>, f: F) -> FnAction<F>
where
    F: Fn(&HostContext<'_>) -> Result<()> + Send + Sync,
{
    FnAction {
        name: name.into(),
        f,
    }
}

impl<F> Action for FnAction<F>
where
    F: Fn(&HostContext<'_>) -> Result<()> + Send + Sync,
{
    fn describe(&self) -> String {
        self.name.clone()
    }

    fn execute(&self, ctx: &HostContext<'_>) -> Result<()> {
        (self.f)(ctx)
    }
}
