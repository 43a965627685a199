use anyhow::{Context as _, Result, bail};
use colored::Colorize;
use inventory::{Inventory, SelectionPolicy, vars};

use super::{host_list, load_inventory};
use crate::cli::InventoryCommand;
use crate::config::Config;
use crate::ui;

pub fn run(config: &Config, cmd: InventoryCommand) -> Result<()> {
    match cmd {
        InventoryCommand::Resolve { group, inventory } => {
            resolve(&load_inventory(&inventory.inventory)?, &group)
        }
        InventoryCommand::Vars {
            host,
            path,
            inventory,
        } => show_vars(&load_inventory(&inventory.inventory)?, &host, path.as_deref()),
        InventoryCommand::Select {
            group,
            count,
            policy,
            write,
            inventory,
        } => {
            let policy = match policy {
                Some(policy) => policy.parse::<SelectionPolicy>()?,
                None => config.selection_policy()?,
            };
            let path = inventory.inventory;
            let mut inv = load_inventory(&path)?;
            select(&mut inv, &group, count, policy)?;

            if write {
                inv.save(&path)
                    .with_context(|| format!("Failed to save inventory: {}", path.display()))?;
                ui::success(&format!("Saved {}", path.display()));
            } else {
                ui::dim("Inventory not saved (pass --write to save)");
            }
            Ok(())
        }
    }
}

fn resolve(inv: &Inventory, pattern: &str) -> Result<()> {
    if !inv.is_known_pattern(pattern) {
        bail!("Unknown host or group: {pattern}");
    }
    let hosts = inv.hosts_for(&[pattern])?;

    ui::header(&format!("{pattern} ({} hosts)", hosts.len()));
    for host in &hosts {
        let roles = inv.roles(host);
        if roles.is_empty() {
            println!("  {host}");
        } else {
            println!("  {host} {}", format!("[{}]", roles.join(", ")).dimmed());
        }
    }
    Ok(())
}

fn show_vars(inv: &Inventory, host: &str, path: Option<&str>) -> Result<()> {
    let merged = inv.host_vars(host)?;
    let value = match path {
        Some(path) => vars::get(&merged, path)?,
        None => &merged,
    };
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn select(inv: &mut Inventory, group: &str, count: usize, policy: SelectionPolicy) -> Result<()> {
    let selection = inv.select(group, count, policy)?;

    ui::header(&format!("Select {count} host(s) for {group}"));
    ui::kv("Policy", &policy.to_string());
    ui::kv("Assigned", &host_list(&selection.assigned));
    if !selection.is_complete() {
        ui::warn(&format!(
            "{group} is {} host(s) short, no ungrouped hosts left",
            selection.shortfall()
        ));
    }
    Ok(())
}
