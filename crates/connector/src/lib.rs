//! # Connector
//!
//! Where commands execute: the controller's own shell or a remote host over
//! SSH, behind one [`Connector`] contract.
//!
//! Connectors are synchronous. The only blocking the engine does happens
//! inside these calls, so each host worker owns the connector for its host.
//!
//! ## Provided Implementations
//!
//! - [`LocalConnector`]: `bash -c` on the controller, `sudo -E` for elevation
//! - [`SshConnector`]: one `ssh2` session per host, exec channels for
//!   commands and SCP for files
//! - [`DefaultConnectorFactory`]: picks one of the above from host variables

pub mod error;
pub mod facts;
pub mod factory;
pub mod local;
pub mod output;
pub mod runtime;
pub mod shell;
pub mod ssh;

pub use error::{Error, Result};
pub use facts::gather_facts;
pub use factory::{ConnectorFactory, DefaultConnectorFactory};
pub use local::LocalConnector;
pub use output::CommandOutput;
pub use runtime::Connector;
pub use ssh::{SshConnector, SshOptions};
