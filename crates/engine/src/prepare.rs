//! Prepare gates: per-host predicates deciding whether a task runs or skips.

use crate::context::{HostContext, Scope};
use crate::error::Result;
use serde_json::Value;

/// Anything that can decide, for one host, whether a task should run.
///
/// `Ok(false)` skips the host. An error fails the host without retrying.
pub trait Prepare: Send + Sync {
    /// Evaluate the gate
    fn evaluate(&self, ctx: &HostContext<'_>) -> Result<bool>;
}

/// Boxed gate
pub type BoxedPrepare = Box<dyn Prepare>;

/// Always run
#[derive(Debug, Clone, Copy, Default)]
pub struct Always;

impl Prepare for Always {
    fn evaluate(&self, _ctx: &HostContext<'_>) -> Result<bool> {
        Ok(true)
    }
}

/// Run when a path exists on the host (or is absent, when negated)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileExists {
    /// Path template
    pub path: String,
    /// Invert the check
    pub negate: bool,
}

impl Prepare for FileExists {
    fn evaluate(&self, ctx: &HostContext<'_>) -> Result<bool> {
        let path = ctx.render(&self.path)?;
        Ok(ctx.connector.file_exists(&path)? != self.negate)
    }
}

/// Run when a cache entry equals a value. A missing entry never matches.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEquals {
    /// Cache to read
    pub scope: Scope,
    /// Key
    pub key: String,
    /// Expected value
    pub value: Value,
}

impl Prepare for CacheEquals {
    fn evaluate(&self, ctx: &HostContext<'_>) -> Result<bool> {
        Ok(ctx.cache(self.scope).get(&self.key).as_ref() == Some(&self.value))
    }
}

/// Run only on the first host of the task (bootstrap leader)
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstHost;

impl Prepare for FirstHost {
    fn evaluate(&self, ctx: &HostContext<'_>) -> Result<bool> {
        Ok(ctx.is_first())
    }
}

/// Run when the host belongs (or does not belong) to a group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HasRole {
    /// Group name
    pub role: String,
    /// Invert the check
    pub negate: bool,
}

impl Prepare for HasRole {
    fn evaluate(&self, ctx: &HostContext<'_>) -> Result<bool> {
        let member = ctx
            .inventory
            .resolve_group(&self.role)
            .iter()
            .any(|h| h == ctx.host);
        Ok(member != self.negate)
    }
}

/// Run when a host variable equals a value
#[derive(Debug, Clone, PartialEq)]
pub struct VarEquals {
    /// Dotted variable path
    pub path: String,
    /// Expected value
    pub value: Value,
}

impl Prepare for VarEquals {
    fn evaluate(&self, ctx: &HostContext<'_>) -> Result<bool> {
        Ok(inventory::vars::lookup(ctx.vars, &self.path) == Some(&self.value))
    }
}

/// Run when a template expression is true (`facts.os.family == 'debian'`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition(pub String);

impl Prepare for Condition {
    fn evaluate(&self, ctx: &HostContext<'_>) -> Result<bool> {
        ctx.eval(&self.0)
    }
}

/// Run when every inner gate passes (short-circuits)
pub struct All(pub Vec<BoxedPrepare>);

impl Prepare for All {
    fn evaluate(&self, ctx: &HostContext<'_>) -> Result<bool> {
        for gate in &self.0 {
            if !gate.evaluate(ctx)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Run when any inner gate passes (short-circuits)
pub struct Any(pub Vec<BoxedPrepare>);

impl Prepare for Any {
    fn evaluate(&self, ctx: &HostContext<'_>) -> Result<bool> {
        for gate in &self.0 {
            if gate.evaluate(ctx)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Invert a gate
pub struct Not(pub BoxedPrepare);

impl Prepare for Not {
    fn evaluate(&self, ctx: &HostContext<'_>) -> Result<bool> {
        Ok(!self.0.evaluate(ctx)?)
    }
}

/// Gate backed by a closure
pub struct FnPrepare<F>(F);

/// Wrap a closure as a [`Prepare`] gate
pub fn from_fn<F>(f: F) -> FnPrepare<F>
where
    F: Fn(&HostContext<'_>) -> Result<bool> + Send + Sync,
{
    FnPrepare(f)
}

impl<F> Prepare for FnPrepare<F>
where
    F: Fn(&HostContext<'_>) -> Result<bool> + Send + Sync,
{
    fn evaluate(&self, ctx: &HostContext<'_>) -> Result<bool> {
        (self.0)(ctx)
    }
}
