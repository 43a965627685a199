use anyhow::{Result, bail};
use colored::Colorize;
use engine::PipelineResult;

use crate::config::Config;
use crate::state::{RunRecord, RunStore};
use crate::ui;

/// Recent runs shown by `status` without an id
const LIST_LIMIT: usize = 20;

pub fn run(config: &Config, run_id: Option<&str>) -> Result<()> {
    let store = RunStore::load(&config.state_dir()?)?;

    match run_id {
        Some(id) => {
            let Some(record) = store.get(id) else {
                bail!("Unknown run: {id}");
            };
            show(id, record);
        }
        None => list(&store),
    }
    Ok(())
}

fn list(store: &RunStore) {
    ui::header("Runs");

    if store.runs.is_empty() {
        ui::dim("No runs recorded yet");
        return;
    }

    let mut runs: Vec<_> = store.runs.iter().collect();
    runs.sort_by_key(|(_, record)| std::cmp::Reverse(record.started_at));

    for (id, record) in runs.into_iter().take(LIST_LIMIT) {
        println!(
            "  {} {} {}",
            id.bold(),
            ui::phase(record.phase),
            format!("{} on {}", record.playbook, record.inventory).dimmed()
        );
    }
}

fn show(id: &str, record: &RunRecord) {
    ui::header(&format!("Run {id}"));
    ui::kv("Playbook", &record.playbook);
    ui::kv("Inventory", &record.inventory);
    ui::kv("Phase", &ui::phase(record.phase).to_string());
    ui::kv("Started", &record.started_at.to_rfc3339());
    if let Some(finished) = record.finished_at {
        let elapsed = finished - record.started_at;
        ui::kv(
            "Finished",
            &format!("{} ({}s)", finished.to_rfc3339(), elapsed.num_seconds()),
        );
    }

    if let Some(result) = &record.result {
        print_result(id, result);
    }
}

/// Summary of a finished run with per-host failure output
pub fn print_result(id: &str, result: &PipelineResult) {
    ui::section("Summary");
    ui::kv("Run", id);
    ui::kv("Phase", &ui::phase(result.phase).to_string());
    ui::kv(
        "Tasks",
        &format!(
            "{} total, {} succeeded, {} failed, {} ignored, {} skipped",
            result.total,
            result.succeeded.to_string().green(),
            result.failed.to_string().red(),
            result.ignored.to_string().yellow(),
            result.skipped.to_string().dimmed(),
        ),
    );
    if let Some(reason) = &result.reason {
        ui::kv("Reason", reason);
    }

    for failed in &result.failures {
        println!("  {} {}", "✗".red(), failed.task.bold());
        for host in &failed.hosts {
            let detail = last_line(&host.stderr)
                .or_else(|| last_line(&host.stdout))
                .unwrap_or("no output");
            ui::dim(&format!("    {}: {detail}", host.host));
        }
    }
}

/// Last non-empty line of command output
fn last_line(output: &str) -> Option<&str> {
    output.lines().map(str::trim).rfind(|line| !line.is_empty())
}
