//! # Inventory
//!
//! The fleet model: hosts, nested groups and layered variables.
//!
//! ## Core Concepts
//!
//! - **Host**: a machine with its own variables and a per-host fact [`Cache`]
//! - **Group**: named membership (hosts plus child groups) with shared variables
//! - **Inventory**: all hosts and groups plus inventory-level variables
//!
//! Variables resolve host > group > inventory. Groups are stored as declared
//! and flattened on demand with [`Inventory::resolve_group`].
//!
//! ## Example
//!
//! ```ignore
//! use inventory::{Group, Inventory, SelectionPolicy};
//! use serde_json::json;
//!
//! let mut inv = Inventory::new();
//! inv.add_host("node1", json!({"connector": {"host": "10.0.0.1"}}));
//! inv.add_host("node2", json!({}));
//! inv.add_group("etcd", Group::with_hosts(["node1"]));
//!
//! assert_eq!(inv.resolve_group("etcd"), vec!["node1"]);
//!
//! let selection = inv.select("kube_worker", 1, SelectionPolicy::Sequential)?;
//! assert_eq!(selection.assigned, vec!["node2"]);
//! ```

pub mod cache;
pub mod error;
pub mod model;
pub mod resolve;
pub mod select;
pub mod vars;

pub use cache::Cache;
pub use error::{Error, Result};
pub use model::{
    ConnectionDefaults, ConnectionKind, ConnectionSpec, Group, Host, Inventory, LOCALHOST,
};
pub use resolve::{ALL_GROUP, UNGROUPED_GROUP};
pub use select::{Selection, SelectionPolicy};
