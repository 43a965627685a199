pub mod batch;
pub mod inventory;
pub mod run;
pub mod status;

use anyhow::{Context as _, Result};
use ::inventory::Inventory;
use std::path::Path;

/// Load an inventory file with a path in the error
pub fn load_inventory(path: &Path) -> Result<Inventory> {
    Inventory::from_path(path)
        .with_context(|| format!("Failed to load inventory: {}", path.display()))
}

/// Render hosts as a comma-separated list
pub fn host_list(hosts: &[String]) -> String {
    if hosts.is_empty() {
        "(none)".to_string()
    } else {
        hosts.join(", ")
    }
}
