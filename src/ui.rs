use colored::{ColoredString, Colorize};
use engine::{HostOutcome, Phase, TaskStatus};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section title
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Print a step indicator
pub fn step(num: usize, total: usize, msg: &str) {
    println!("{} {}", format!("[{num}/{total}]").blue().bold(), msg);
}

/// Symbol for a finished task
pub fn task_symbol(status: TaskStatus) -> ColoredString {
    match status {
        TaskStatus::Succeeded => "✓".green(),
        TaskStatus::Failed => "✗".red(),
        TaskStatus::Ignored => "⚠".yellow(),
        TaskStatus::Skipped => "⊘".dimmed(),
    }
}

/// Symbol for one host's outcome
pub fn host_symbol(outcome: &HostOutcome) -> ColoredString {
    match outcome {
        HostOutcome::Succeeded => "✓".green(),
        HostOutcome::Skipped => "○".dimmed(),
        HostOutcome::Failed { .. } => "✗".red(),
    }
}

/// Colored phase label
pub fn phase(phase: Phase) -> ColoredString {
    let label = phase.to_string();
    match phase {
        Phase::Pending => label.dimmed(),
        Phase::Running => label.cyan(),
        Phase::Succeeded => label.green(),
        Phase::Failed => label.red(),
    }
}

// ============================================================================
// Tests
// ============================================================================
