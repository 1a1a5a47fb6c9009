use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Parser)]
#[command(name = "floe")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Declarative infrastructure for data warehouse accounts", long_about = None)]
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
    /// Show the changes that would bring the account to the blueprint
    Plan(PlanArgs),

    /// Bring the account to the blueprint
    Apply(ApplyArgs),

    /// Remove every resource declared in the blueprint
    Destroy(DestroyArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Where the blueprint and account come from, and how to reconcile them
#[derive(Args, Clone, Default)]
pub struct TargetArgs {
    /// Blueprint file [default: <config dir>/blueprint.toml]
    #[arg(short, long, env = "FLOE_BLUEPRINT")]
    pub blueprint: Option<String>,

    /// Account snapshot [default: <config dir>/snapshot.json]
    #[arg(short, long, env = "FLOE_SNAPSHOT")]
    pub snapshot: Option<String>,

    /// Run mode: create-or-update, sync, sync-all
    #[arg(long)]
    pub run_mode: Option<String>,

    /// Kinds this run may touch (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub allowlist: Vec<String>,

    /// Never transfer ownership
    #[arg(long)]
    pub ignore_ownership: bool,

    /// Concurrent remote fetches
    #[arg(short = 'j', long)]
    pub workers: Option<usize>,
}

#[derive(Args)]
pub struct PlanArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Print the plan as JSON
    #[arg(long)]
    pub json: bool,

    /// Also print the statements the plan compiles to
    #[arg(long)]
    pub sql: bool,

    /// Save the plan as JSON for a later apply
    #[arg(short, long)]
    pub out: Option<String>,
}

#[derive(Args)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Apply a saved plan instead of planning again
    #[arg(short, long)]
    pub plan: Option<String>,

    /// Compile statements without running them
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Args)]
pub struct DestroyArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Compile statements without running them
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}
