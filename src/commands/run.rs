use anyhow::{Context as _, Result, bail};
use colored::Colorize;
use connector::{ConnectorFactory, DefaultConnectorFactory};
use engine::{NoProgress, Pipeline, PipelineHandle, PipelineResult, ProgressCallback, Task, serial};
use inventory::Inventory;
use std::sync::Arc;

use super::{host_list, load_inventory};
use crate::Context;
use crate::cli::RunArgs;
use crate::config::Config;
use crate::playbook::Playbook;
use crate::progress::TerminalProgress;
use crate::state::RunStore;
use crate::ui;

pub fn run(ctx: &Context, config: &Config, args: RunArgs) -> Result<()> {
    let inventory_path = args.inventory.inventory;
    let inventory = load_inventory(&inventory_path)?;
    let playbook = Playbook::load(&args.playbook)?;
    playbook
        .validate(&inventory)
        .with_context(|| format!("Invalid playbook: {}", args.playbook.display()))?;

    let concurrency = args.jobs.unwrap_or(config.engine.concurrency);
    if concurrency == 0 {
        bail!("--jobs must be at least 1");
    }
    let pipeline = playbook
        .to_pipeline(&config.retry_policy())
        .concurrency(concurrency)
        .select_tags(&args.tags, &args.skip_tags);
    if pipeline.modules.is_empty() {
        bail!("No tasks left after tag selection");
    }

    if !ctx.quiet {
        print_plan(&pipeline, &inventory, ctx.verbose > 0)?;
    }

    if args.dry_run {
        println!();
        ui::warn("Dry run - nothing was executed");
        return Ok(());
    }

    if !args.yes && !confirm_proceed()? {
        ui::info("Cancelled");
        return Ok(());
    }

    let mut store = RunStore::load(&config.state_dir()?)?;
    let id = store.begin(&playbook.name, &inventory_path);
    store.mark_running(&id)?;
    store.save()?;
    log::info!("Started run {id}");

    let factory: Arc<dyn ConnectorFactory> = Arc::new(DefaultConnectorFactory::new(
        config.connection_defaults(),
        config.ssh_options(),
    ));
    let progress: Arc<dyn ProgressCallback> = if ctx.quiet {
        Arc::new(NoProgress)
    } else {
        Arc::new(TerminalProgress::new())
    };

    let handle = PipelineHandle::spawn(pipeline, Arc::new(inventory), factory, progress)
        .context("Failed to start pipeline")?;
    let result = handle.wait().unwrap_or_else(|e| {
        let mut result = PipelineResult::default();
        result.fail(e.to_string());
        result
    });

    store.finish(&id, result.clone())?;
    store.save()?;

    if !ctx.quiet {
        super::status::print_result(&id, &result);
    }

    if !result.is_success() {
        bail!(
            "Run {id} failed: {}",
            result.reason.as_deref().unwrap_or("unknown error")
        );
    }

    ui::success(&format!("Run {id} complete"));
    Ok(())
}

/// Print modules, tasks and the hosts each would touch
fn print_plan(pipeline: &Pipeline, inventory: &Inventory, detailed: bool) -> Result<()> {
    ui::header(&format!("Playbook: {}", pipeline.name));

    for (i, module) in pipeline.modules.iter().enumerate() {
        ui::section(&format!("[{}/{}] {}", i + 1, pipeline.modules.len(), module.name));
        if !module.desc.is_empty() {
            ui::dim(&module.desc);
        }
        if module.skip.is_some() {
            ui::dim("skipped at run time when its condition holds");
        }

        for task in &module.tasks {
            print_task(task, inventory, detailed)?;
        }
        if !module.rescue.is_empty() {
            ui::dim("  on failure:");
            for task in &module.rescue {
                print_task(task, inventory, detailed)?;
            }
        }
        if !module.always.is_empty() {
            ui::dim("  always:");
            for task in &module.always {
                print_task(task, inventory, detailed)?;
            }
        }

        let union = module.union_hosts(inventory)?;
        if !module.serial.is_empty() && !union.is_empty() {
            for (n, wave) in serial::batch(&union, &module.serial)?.iter().enumerate() {
                ui::dim(&format!("  batch {}: {}", n + 1, host_list(wave)));
            }
        }
    }
    Ok(())
}

fn print_task(task: &Task, inventory: &Inventory, detailed: bool) -> Result<()> {
    let hosts = if task.local {
        "local".to_string()
    } else {
        host_list(&task.target_hosts(inventory)?)
    };
    let mode = match (task.run_once, task.parallel) {
        (true, _) => "once",
        (false, true) => "parallel",
        (false, false) => "serial",
    };
    println!(
        "  {} {} {}",
        "•".cyan(),
        task.name,
        format!("({}, {mode})", task.action.describe()).dimmed()
    );
    if detailed {
        if !task.desc.is_empty() {
            ui::dim(&format!("    {}", task.desc));
        }
        if !task.tags.is_empty() {
            ui::dim(&format!("    tags: {}", task.tags.join(", ")));
        }
    }
    ui::dim(&format!("    hosts: {hosts}"));
    Ok(())
}

/// Confirm with user
fn confirm_proceed() -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt("Continue?")
        .default(true)
        .interact()?;

    Ok(confirmed)
}
