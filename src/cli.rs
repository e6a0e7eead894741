use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use crate::paths;

const EXIT_CODES: &str = "\
Exit codes:
  0    success
  1    usage, I/O or unexpected error
  2    plan does not compile (cycle, missing or duplicate step)
  3    a step failed
  4    verification failed
  130  cancelled";

#[derive(Parser)]
#[command(name = "provisioner")]
#[command(version)]
#[command(about = "Repeatable, resumable provisioning of a single host", long_about = None)]
#[command(propagate_version = true)]
#[command(after_help = EXIT_CODES)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Plan file (TOML, or JSON with a .json extension)
    #[arg(
        short,
        long,
        global = true,
        env = paths::ENV_PLAN,
        default_value = paths::DEFAULT_PLAN_FILE
    )]
    pub file: PathBuf,

    /// Directory holding recorded step state
    #[arg(long, global = true, env = paths::ENV_STATE_DIR)]
    pub state: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show the execution order and what a run would do
    Plan,

    /// Run every step that has not yet succeeded
    Apply(ApplyArgs),

    /// Show the recorded outcome of each step
    Status {
        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Re-check the effects of succeeded steps
    Verify,

    /// Forget recorded outcomes so steps run again
    Reset {
        /// Steps to forget
        #[arg(required_unless_present = "all")]
        steps: Vec<String>,

        /// Forget every step and persisted environment variables
        #[arg(long, conflicts_with = "steps")]
        all: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser)]
pub struct ApplyArgs {
    /// Show what would run without changing anything
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Don't ask for confirmation
    #[arg(short, long)]
    pub yes: bool,

    /// Skip post-run verification
    #[arg(long)]
    pub no_verify: bool,
}
