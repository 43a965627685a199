use anyhow::{Context as _, Result, bail};
use colored::Colorize;
use engine::{SerialEntry, serial};
use inventory::Inventory;

use super::{host_list, load_inventory};
use crate::cli::BatchArgs;
use crate::ui;

pub fn run(args: BatchArgs) -> Result<()> {
    let inv = load_inventory(&args.inventory.inventory)?;
    let spec = parse_entries(&args.serial)?;
    let waves = plan(&inv, &args.pattern, &spec)?;

    let total: usize = waves.iter().map(Vec::len).sum();
    ui::header(&format!(
        "{} ({total} hosts, {} batches)",
        args.pattern,
        waves.len()
    ));
    for (i, wave) in waves.iter().enumerate() {
        println!(
            "  {} {}",
            format!("batch {}", i + 1).cyan(),
            host_list(wave)
        );
    }
    Ok(())
}

fn parse_entries(raw: &[String]) -> Result<Vec<SerialEntry>> {
    raw.iter()
        .map(|entry| {
            entry
                .parse::<SerialEntry>()
                .with_context(|| format!("Invalid --serial value: {entry}"))
        })
        .collect()
}

/// Resolve `pattern` and split its hosts into waves
fn plan(inv: &Inventory, pattern: &str, spec: &[SerialEntry]) -> Result<Vec<Vec<String>>> {
    if !inv.is_known_pattern(pattern) {
        bail!("Unknown host or group: {pattern}");
    }
    let hosts = inv.hosts_for(&[pattern])?;
    if hosts.is_empty() {
        return Ok(Vec::new());
    }
    Ok(serial::batch(&hosts, spec)?)
}
