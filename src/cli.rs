use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "kubefleet")]
#[command(version)]
#[command(about = "Inventory-driven host orchestration for Kubernetes clusters", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run a playbook against an inventory
    Run(RunArgs),

    /// Inspect and edit the inventory
    #[command(subcommand)]
    Inventory(InventoryCommand),

    /// Preview how a host pattern splits into rollout batches
    Batch(BatchArgs),

    /// Show recorded runs
    Status {
        /// Run id (defaults to listing recent runs)
        run_id: Option<String>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Inventory file shared by most commands
#[derive(Args, Clone)]
pub struct InventoryArg {
    /// Inventory file (.yaml, .yml or .json)
    #[arg(short, long, env = "KUBEFLEET_INVENTORY")]
    pub inventory: PathBuf,
}

// ============================================================================
// Run
// ============================================================================

#[derive(Args)]
pub struct RunArgs {
    /// Playbook file (.yaml, .yml, .json or .toml)
    pub playbook: PathBuf,

    #[command(flatten)]
    pub inventory: InventoryArg,

    /// Hosts a parallel task works on at once (overrides config)
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Print the plan without running it
    #[arg(long)]
    pub dry_run: bool,

    /// Only run tasks carrying one of these tags
    #[arg(long, value_delimiter = ',')]
    pub tags: Vec<String>,

    /// Skip tasks carrying any of these tags
    #[arg(long, value_delimiter = ',')]
    pub skip_tags: Vec<String>,
}

// ============================================================================
// Inventory
// ============================================================================

#[derive(Subcommand)]
pub enum InventoryCommand {
    /// Flatten a group (or host pattern) into hosts
    Resolve {
        /// Group name or host pattern
        group: String,

        #[command(flatten)]
        inventory: InventoryArg,
    },

    /// Show a host's effective variables
    Vars {
        /// Host name
        host: String,

        /// Dotted path into the variables
        path: Option<String>,

        #[command(flatten)]
        inventory: InventoryArg,
    },

    /// Assign ungrouped hosts to a group
    Select {
        /// Target group
        group: String,

        /// Number of hosts to assign
        count: usize,

        /// random or sequential (defaults to config)
        #[arg(short, long)]
        policy: Option<String>,

        /// Save the updated inventory
        #[arg(short, long)]
        write: bool,

        #[command(flatten)]
        inventory: InventoryArg,
    },
}

// ============================================================================
// Batch
// ============================================================================

#[derive(Args)]
pub struct BatchArgs {
    /// Group name or host pattern
    pub pattern: String,

    /// Batch sizes: counts or percentages (e.g. --serial 1 --serial 30%)
    #[arg(short, long, required = true, num_args = 1..)]
    pub serial: Vec<String>,

    #[command(flatten)]
    pub inventory: InventoryArg,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::parse_from([
            "kubefleet", "-vv", "run", "site.yaml", "-i", "hosts.yaml", "--jobs", "4", "--dry-run",
        ]);
        assert_eq!(cli.verbose, 2);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.playbook, PathBuf::from("site.yaml"));
        assert_eq!(args.inventory.inventory, PathBuf::from("hosts.yaml"));
        assert_eq!(args.jobs, Some(4));
        assert!(args.dry_run);
        assert!(!args.yes);
    }

    #[test]
    fn test_parse_batch_serial_list() {
        let cli = Cli::parse_from([
            "kubefleet", "batch", "k8s_cluster", "-i", "hosts.yaml", "--serial", "1", "30%",
        ]);
        let Command::Batch(args) = cli.command else {
            panic!("expected batch");
        };
        assert_eq!(args.serial, vec!["1", "30%"]);
    }
}
