//! Choosing a connector for an inventory host.

use crate::error::Result;
use crate::local::LocalConnector;
use crate::runtime::Connector;
use crate::ssh::{SshConnector, SshOptions};
use inventory::{ConnectionDefaults, ConnectionKind, Inventory};
use std::sync::Arc;

/// Builds connectors for hosts.
///
/// The engine asks the factory once per host per run; implementations
/// decide the transport. Tests substitute recording factories here.
pub trait ConnectorFactory: Send + Sync {
    /// Connector for an inventory host
    fn connect(&self, inventory: &Inventory, host: &str) -> Result<Arc<dyn Connector>>;

    /// Connector for the controller itself
    fn local(&self) -> Arc<dyn Connector> {
        Arc::new(LocalConnector::new(inventory::LOCALHOST))
    }
}

/// Picks local or SSH from each host's `connector` variables
#[derive(Debug, Clone, Default)]
pub struct DefaultConnectorFactory {
    /// Fallback user, port and key
    pub defaults: ConnectionDefaults,
    /// Client-side SSH settings
    pub ssh: SshOptions,
}

impl DefaultConnectorFactory {
    /// Create a factory
    pub fn new(defaults: ConnectionDefaults, ssh: SshOptions) -> Self {
        Self { defaults, ssh }
    }
}

impl ConnectorFactory for DefaultConnectorFactory {
    fn connect(&self, inventory: &Inventory, host: &str) -> Result<Arc<dyn Connector>> {
        let cache = Arc::clone(inventory.require_host(host)?.cache());
        let spec = inventory.connection(host, &self.defaults)?;

        Ok(match spec.kind {
            ConnectionKind::Local => {
                let connector = LocalConnector::with_cache(host, cache)
                    .password(spec.password.clone());
                Arc::new(connector)
            }
            ConnectionKind::Ssh => {
                log::debug!("{host}: ssh {}@{}:{}", spec.user, spec.address, spec.port);
                Arc::new(SshConnector::new(host, spec, self.ssh.clone(), cache))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_factory_shares_host_cache() {
        let mut inv = Inventory::new();
        inv.add_host("localhost", json!({}));
        let factory = DefaultConnectorFactory::default();

        let conn = factory.connect(&inv, "localhost").unwrap();
        conn.cache().set("seen", true);
        assert_eq!(
            inv.host("localhost").unwrap().cache().get("seen"),
            Some(json!(true))
        );
    }

    #[test]
    fn test_factory_unknown_host() {
        let inv = Inventory::new();
        let factory = DefaultConnectorFactory::default();
        assert!(factory.connect(&inv, "ghost").is_err());
    }

    #[test]
    fn test_factory_builds_ssh_for_remote_hosts() {
        let mut inv = Inventory::new();
        inv.add_host("node1", json!({"connector": {"host": "10.0.0.1"}}));
        let factory = DefaultConnectorFactory::default();
        let conn = factory.connect(&inv, "node1").unwrap();
        assert_eq!(conn.host(), "node1");
    }
}
