//! `apply` - run the plan and verify the result

use anyhow::{Context as _, Result};
use colored::Colorize;
use dialoguer::Confirm;
use plankit::{DryRunAction, Engine, FileStateRecorder};
use std::io::IsTerminal;

use crate::Context;
use crate::cli::ApplyArgs;
use crate::handlers;
use crate::progress::CliProgress;
use crate::runner;
use crate::signal;
use crate::ui;

pub fn run(ctx: &Context, args: ApplyArgs) -> Result<()> {
    let loaded = super::load_plan(ctx)?;
    let plan = &loaded.plan;
    let mut state = FileStateRecorder::open(ctx.state_file());
    let engine = Engine::new(handlers::registry(ctx.env_file()));

    let pending: Vec<String> = engine
        .dry_run(plan, &state)
        .into_iter()
        .filter(|(_, action)| *action == DryRunAction::Run)
        .map(|(id, _)| id)
        .collect();

    if !ctx.quiet {
        ui::header(&format!("Provisioning: {}", loaded.name));
        ui::kv("Plan", &ctx.plan_path.display().to_string());
        ui::kv("State", &state.path().display().to_string());
    }

    if args.dry_run {
        println!();
        if pending.is_empty() {
            ui::success("Nothing to do");
        } else {
            ui::info(&format!("Would run {} of {} steps:", pending.len(), plan.len()));
            for id in &pending {
                println!("  {} {}", "+".green(), id);
            }
        }
        return Ok(());
    }

    if !pending.is_empty() && !args.yes && std::io::stdin().is_terminal() {
        println!();
        let proceed = Confirm::new()
            .with_prompt(format!("Run {} of {} steps?", pending.len(), plan.len()))
            .default(true)
            .interact()
            .context("Failed to read user input")?;
        if !proceed {
            ui::info("Aborted. No changes made.");
            return Ok(());
        }
    }

    let privileged = pending
        .iter()
        .filter_map(|id| plan.get(id))
        .filter(|step| handlers::needs_privilege(step))
        .count();
    if privileged > 0 {
        runner::acquire_sudo(&format!("{privileged} steps install system packages"))?;
    }

    let cancel = signal::install();
    let mut progress = CliProgress::new(plan.len(), ctx.quiet);
    println!();
    let summary = engine.run(plan, &mut state, &mut progress, &cancel)?;

    println!();
    if summary.did_work() {
        ui::success(&format!(
            "{} steps succeeded, {} already done",
            summary.succeeded, summary.skipped
        ));
    } else {
        ui::success(&format!("All {} steps already succeeded", summary.total));
    }

    if args.no_verify {
        log::info!("Skipping verification");
        return Ok(());
    }
    super::verify::check(ctx, plan, &state)
}
