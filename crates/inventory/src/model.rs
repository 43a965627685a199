//! Hosts, groups and the inventory aggregate.

use crate::cache::Cache;
use crate::error::{Error, Result};
use crate::vars;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Name of the host that always refers to the controller itself
pub const LOCALHOST: &str = "localhost";

/// Variable key holding the connection settings of a host
pub const CONNECTOR_KEY: &str = "connector";

/// Variable key holding a host's cluster-internal address
pub const INTERNAL_ADDRESS_KEY: &str = "internal_ipv4";

// ============================================================================
// Host
// ============================================================================

/// A machine in the fleet.
///
/// The persisted form of a host is just its variable document; the name is
/// the key it is stored under. The fact cache is runtime-only and shared
/// between clones of the same host.
#[derive(Debug, Clone)]
pub struct Host {
    name: String,
    vars: Value,
    cache: Arc<Cache>,
}

impl Host {
    /// Create a host with the given variables
    pub fn new(name: impl Into<String>, vars: Value) -> Self {
        Self {
            name: name.into(),
            vars: if vars.is_null() { vars::empty() } else { vars },
            cache: Arc::new(Cache::new()),
        }
    }

    /// Host name (inventory key)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Host-level variables (highest precedence)
    pub fn vars(&self) -> &Value {
        &self.vars
    }

    /// Mutable host-level variables
    pub fn vars_mut(&mut self) -> &mut Value {
        &mut self.vars
    }

    /// Per-host fact cache
    pub fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }
}

impl PartialEq for Host {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.vars == other.vars
    }
}

// ============================================================================
// Group
// ============================================================================

/// A named collection of hosts and child groups sharing variables.
///
/// Membership is stored as declared; flattening happens on demand via
/// [`Inventory::resolve_group`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Group {
    /// Child group names
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,

    /// Member host names
    #[serde(default)]
    pub hosts: Vec<String>,

    /// Group variables
    #[serde(default = "vars::empty", skip_serializing_if = "is_empty_doc")]
    pub vars: Value,
}

impl Group {
    /// A group with the given direct members
    pub fn with_hosts<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hosts: hosts.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Add a child group
    pub fn child(mut self, group: impl Into<String>) -> Self {
        self.groups.push(group.into());
        self
    }

    /// Set group variables
    pub fn vars(mut self, vars: Value) -> Self {
        self.vars = vars;
        self
    }
}

fn is_empty_doc(value: &Value) -> bool {
    value.is_null() || value.as_object().is_some_and(serde_json::Map::is_empty)
}

// ============================================================================
// Connection descriptor
// ============================================================================

/// How the controller reaches a host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    /// Run on the controller itself
    Local,
    /// Run over SSH
    Ssh,
}

/// Fallback connection settings applied when host variables omit them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDefaults {
    /// Login user
    pub user: String,
    /// SSH port
    pub port: u16,
    /// Private key path
    pub private_key: Option<String>,
}

impl Default for ConnectionDefaults {
    fn default() -> Self {
        Self {
            user: "root".to_string(),
            port: 22,
            private_key: None,
        }
    }
}

/// Resolved connection settings for one host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSpec {
    /// Transport
    pub kind: ConnectionKind,
    /// Address to connect to
    pub address: String,
    /// SSH port
    pub port: u16,
    /// Login user
    pub user: String,
    /// Password (used for SSH and sudo when present)
    pub password: Option<String>,
    /// Private key path
    pub private_key: Option<String>,
}

impl ConnectionSpec {
    /// Build the descriptor from a host's merged variables
    pub fn from_vars(host: &str, vars: &Value, defaults: &ConnectionDefaults) -> Result<Self> {
        let key = |field: &str| format!("{CONNECTOR_KEY}.{field}");

        let kind = match vars::lookup(vars, &key("type")).and_then(Value::as_str) {
            Some("local") => ConnectionKind::Local,
            Some("ssh") => ConnectionKind::Ssh,
            Some(other) => {
                return Err(Error::Invalid(format!(
                    "host {host}: unknown connector type \"{other}\""
                )));
            }
            None if host == LOCALHOST => ConnectionKind::Local,
            None => ConnectionKind::Ssh,
        };

        let port = match vars::int_var(vars, &key("port")) {
            Ok(port) => u16::try_from(port)
                .map_err(|_| Error::Invalid(format!("host {host}: port {port} out of range")))?,
            Err(Error::KeyNotFound { .. }) => defaults.port,
            Err(e) => return Err(e),
        };

        Ok(Self {
            kind,
            address: vars::string_var(vars, &key("host")).unwrap_or_else(|_| host.to_string()),
            port,
            user: vars::string_var(vars, &key("user")).unwrap_or_else(|_| defaults.user.clone()),
            password: vars::string_var(vars, &key("password")).ok(),
            private_key: vars::string_var(vars, &key("private_key"))
                .ok()
                .or_else(|| defaults.private_key.clone()),
        })
    }
}

// ============================================================================
// Inventory
// ============================================================================

/// On-disk shape of an inventory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct InventoryFile {
    #[serde(default)]
    hosts: IndexMap<String, Value>,
    #[serde(default = "vars::empty", skip_serializing_if = "is_empty_doc")]
    vars: Value,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    groups: IndexMap<String, Group>,
}

/// All hosts, groups and inventory-level variables of one cluster.
///
/// Hosts and groups keep their declaration order. Variable precedence is
/// host > group > inventory; among groups, later declarations win.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "InventoryFile", into = "InventoryFile")]
pub struct Inventory {
    pub(crate) hosts: IndexMap<String, Host>,
    pub(crate) vars: Value,
    pub(crate) groups: IndexMap<String, Group>,
}

impl From<InventoryFile> for Inventory {
    fn from(file: InventoryFile) -> Self {
        let hosts = file
            .hosts
            .into_iter()
            .map(|(name, vars)| {
                let host = Host::new(name.clone(), vars);
                (name, host)
            })
            .collect();
        Self {
            hosts,
            vars: if file.vars.is_null() { vars::empty() } else { file.vars },
            groups: file.groups,
        }
    }
}

impl From<Inventory> for InventoryFile {
    fn from(inventory: Inventory) -> Self {
        Self {
            hosts: inventory
                .hosts
                .into_iter()
                .map(|(name, host)| (name, host.vars))
                .collect(),
            vars: inventory.vars,
            groups: inventory.groups,
        }
    }
}

impl Default for Inventory {
    fn default() -> Self {
        Self::new()
    }
}

impl Inventory {
    /// Create an empty inventory
    pub fn new() -> Self {
        Self {
            hosts: IndexMap::new(),
            vars: vars::empty(),
            groups: IndexMap::new(),
        }
    }

    /// Load an inventory from a YAML or JSON file, chosen by extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let inventory = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => Self::from_yaml_str(&content)?,
            Some("json") => Self::from_json_str(&content)?,
            _ => return Err(Error::UnsupportedFormat(path.to_path_buf())),
        };
        log::debug!(
            "Loaded inventory from {} ({} hosts, {} groups)",
            path.display(),
            inventory.hosts.len(),
            inventory.groups.len()
        );
        Ok(inventory)
    }

    /// Parse a YAML inventory
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let inventory: Self = serde_yaml::from_str(content)?;
        inventory.validate()?;
        Ok(inventory)
    }

    /// Parse a JSON inventory
    pub fn from_json_str(content: &str) -> Result<Self> {
        let inventory: Self = serde_json::from_str(content)?;
        inventory.validate()?;
        Ok(inventory)
    }

    /// Write the inventory back to disk in the format implied by the extension
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => serde_yaml::to_string(self)?,
            Some("json") => serde_json::to_string_pretty(self)?,
            _ => return Err(Error::UnsupportedFormat(path.to_path_buf())),
        };
        fs::write(path, content)?;
        Ok(())
    }

    /// Structural checks on variable documents
    pub fn validate(&self) -> Result<()> {
        if !self.vars.is_object() {
            return Err(Error::Invalid("inventory vars must be a mapping".into()));
        }
        for host in self.hosts.values() {
            if !host.vars.is_object() {
                return Err(Error::Invalid(format!(
                    "vars of host {} must be a mapping",
                    host.name
                )));
            }
        }
        for (name, group) in &self.groups {
            if !group.vars.is_null() && !group.vars.is_object() {
                return Err(Error::Invalid(format!("vars of group {name} must be a mapping")));
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Hosts
    // ------------------------------------------------------------------------

    /// Add (or replace) a host
    pub fn add_host(&mut self, name: impl Into<String>, vars: Value) -> &mut Host {
        let name = name.into();
        self.hosts
            .entry(name.clone())
            .and_modify(|host| host.vars = vars.clone())
            .or_insert_with(|| Host::new(name, vars))
    }

    /// Remove a host and every group membership referring to it
    pub fn remove_host(&mut self, name: &str) -> Option<Host> {
        let removed = self.hosts.shift_remove(name)?;
        for group in self.groups.values_mut() {
            group.hosts.retain(|h| h != name);
        }
        Some(removed)
    }

    /// Look up a host
    pub fn host(&self, name: &str) -> Option<&Host> {
        self.hosts.get(name)
    }

    /// Look up a host, failing if it is absent
    pub fn require_host(&self, name: &str) -> Result<&Host> {
        self.host(name)
            .ok_or_else(|| Error::UnknownHost(name.to_string()))
    }

    /// Whether a host exists
    pub fn contains_host(&self, name: &str) -> bool {
        self.hosts.contains_key(name)
    }

    /// Hosts in declaration order
    pub fn hosts(&self) -> impl Iterator<Item = &Host> {
        self.hosts.values()
    }

    /// Host names in declaration order
    pub fn host_names(&self) -> Vec<String> {
        self.hosts.keys().cloned().collect()
    }

    // ------------------------------------------------------------------------
    // Groups
    // ------------------------------------------------------------------------

    /// Add (or replace) a group
    pub fn add_group(&mut self, name: impl Into<String>, group: Group) {
        self.groups.insert(name.into(), group);
    }

    /// Look up a group
    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.get(name)
    }

    /// Group names in declaration order
    pub fn group_names(&self) -> Vec<String> {
        self.groups.keys().cloned().collect()
    }

    // ------------------------------------------------------------------------
    // Variables
    // ------------------------------------------------------------------------

    /// Inventory-level variables
    pub fn vars(&self) -> &Value {
        &self.vars
    }

    /// Mutable inventory-level variables
    pub fn vars_mut(&mut self) -> &mut Value {
        &mut self.vars
    }

    /// Effective variables of a host.
    ///
    /// Layers, lowest precedence first: inventory vars, then the vars of every
    /// group the host belongs to (directly or via child groups) in group
    /// declaration order, then the host's own vars. `inventory_name` and
    /// `hostname` default to the host name.
    pub fn host_vars(&self, name: &str) -> Result<Value> {
        let host = self.require_host(name)?;

        let mut layers = vec![&self.vars];
        for (group_name, group) in &self.groups {
            if self.resolve_group(group_name).iter().any(|h| h == name) {
                layers.push(&group.vars);
            }
        }
        layers.push(&host.vars);

        let mut merged = vars::combine(layers);
        for key in ["inventory_name", "hostname"] {
            if vars::lookup(&merged, key).is_none() {
                vars::set(&mut merged, key, Value::String(name.to_string()));
            }
        }
        Ok(merged)
    }

    /// Declared groups whose resolution contains the host
    pub fn roles(&self, name: &str) -> Vec<String> {
        self.groups
            .keys()
            .filter(|group| self.resolve_group(group).iter().any(|h| h == name))
            .cloned()
            .collect()
    }

    /// Connection descriptor of a host
    pub fn connection(&self, name: &str, defaults: &ConnectionDefaults) -> Result<ConnectionSpec> {
        let vars = self.host_vars(name)?;
        ConnectionSpec::from_vars(name, &vars, defaults)
    }

    /// Cluster-internal address of a host, falling back to its connect address
    pub fn internal_address(&self, name: &str) -> Result<String> {
        let vars = self.host_vars(name)?;
        if let Ok(address) = vars::string_var(&vars, INTERNAL_ADDRESS_KEY) {
            return Ok(address);
        }
        Ok(vars::string_var(&vars, &format!("{CONNECTOR_KEY}.host"))
            .unwrap_or_else(|_| name.to_string()))
    }
}
