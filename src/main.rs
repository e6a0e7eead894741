mod cli;
mod commands;
mod envfile;
mod handlers;
mod hooks;
mod paths;
mod progress;
mod runner;
mod schema;
mod signal;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use plankit::{RunError, exit_code};
use std::io;
use std::path::PathBuf;

use envfile::EnvFile;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub plan_path: PathBuf,
    pub state_dir: PathBuf,
}

impl Context {
    pub fn state_file(&self) -> PathBuf {
        self.state_dir.join(paths::STATE_FILE)
    }

    pub fn env_file(&self) -> EnvFile {
        EnvFile::new(self.state_dir.join(paths::ENV_FILE))
    }
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    if let Err(e) = run(cli) {
        ui::error(&format!("{e:#}"));
        std::process::exit(exit_code_for(&e));
    }
}

/// Exit status for an error, looking through any added context
fn exit_code_for(e: &anyhow::Error) -> i32 {
    match e.downcast_ref::<RunError>() {
        Some(run_error) => run_error.exit_code(),
        None => exit_code::GENERAL,
    }
}

fn run(cli: Cli) -> Result<()> {
    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        plan_path: paths::expand(&cli.file.to_string_lossy()),
        state_dir: paths::state_dir(cli.state.as_deref())?,
    };
    log::debug!(
        "verbosity {}, plan {}, state {}",
        ctx.verbose,
        ctx.plan_path.display(),
        ctx.state_dir.display()
    );

    // Steps that already succeeded are skipped, so their variables must come
    // from the previous run
    let restored = ctx.env_file().apply_to_process();
    if restored > 0 {
        log::info!("Restored {restored} environment variables");
    }

    match cli.command {
        Command::Plan => commands::plan::run(&ctx),
        Command::Apply(args) => commands::apply::run(&ctx, args),
        Command::Status { json } => commands::status::run(&ctx, json),
        Command::Verify => commands::verify::run(&ctx),
        Command::Reset { steps, all } => commands::reset::run(&ctx, &steps, all),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "provisioner", &mut io::stdout());
            Ok(())
        }
    }
}
