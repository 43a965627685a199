//! Terminal progress for pipeline runs.

use colored::Colorize;
use engine::{HostOutcome, ProgressCallback, TaskStatus};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::{Mutex, PoisonError};

use crate::ui;

const BAR_TEMPLATE: &str = "  {spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {msg}";

/// Step headers per module and one progress bar per task
#[derive(Default)]
pub struct TerminalProgress {
    bar: Mutex<Option<ProgressBar>>,
}

impl TerminalProgress {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Some(bar) = self.bar.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            f(bar);
        }
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_module_start(&self, module: &str, index: usize, total: usize) {
        println!();
        ui::step(index + 1, total, module);
    }

    fn on_module_skip(&self, module: &str) {
        println!("  {} {} {}", "⊘".dimmed(), module, "(skipped)".dimmed());
    }

    fn on_task_start(&self, task: &str, hosts: usize) {
        let bar = ProgressBar::new(hosts as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template(BAR_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        bar.set_message(task.to_string());
        *self.bar.lock().unwrap_or_else(PoisonError::into_inner) = Some(bar);
    }

    fn on_host_complete(&self, task: &str, host: &str, outcome: &HostOutcome) {
        self.with_bar(|bar| {
            if let HostOutcome::Failed { error, .. } = outcome {
                bar.println(format!("    {} {host}: {error}", ui::host_symbol(outcome)));
            }
            bar.set_message(format!("{task} {} {host}", ui::host_symbol(outcome)));
            bar.inc(1);
        });
    }

    fn on_task_complete(&self, task: &str, status: TaskStatus) {
        if let Some(bar) = self.bar.lock().unwrap_or_else(PoisonError::into_inner).take() {
            bar.finish_and_clear();
        }
        let label = match status {
            TaskStatus::Succeeded => String::new(),
            TaskStatus::Failed => " (failed)".to_string(),
            TaskStatus::Ignored => " (failed, ignored)".to_string(),
            TaskStatus::Skipped => " (skipped)".to_string(),
        };
        println!("  {} {task}{}", ui::task_symbol(status), label.dimmed());
    }

    fn on_message(&self, host: &str, message: &str) {
        let line = format!("    {} {host}: {message}", "ℹ".blue());
        let printed = self
            .bar
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|bar| bar.println(&line))
            .is_some();
        if !printed {
            println!("{line}");
        }
    }
}
