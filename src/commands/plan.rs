//! `plan` - show the execution order

use anyhow::Result;
use colored::Colorize;
use plankit::{DryRunAction, Engine, FileStateRecorder, HandlerRegistry};

use crate::Context;
use crate::ui;

pub fn run(ctx: &Context) -> Result<()> {
    let loaded = super::load_plan(ctx)?;
    let state = FileStateRecorder::open(ctx.state_file());
    // Dry runs only consult recorded state, so no handlers are needed
    let preview = Engine::new(HandlerRegistry::new()).dry_run(&loaded.plan, &state);

    ui::header(&format!("Plan: {}", loaded.name));
    let total = loaded.plan.len();
    for (i, (step, (_, action))) in loaded.plan.iter().zip(&preview).enumerate() {
        let marker = match action {
            DryRunAction::Run => "run".cyan(),
            DryRunAction::Skip => "done".green(),
        };
        let requires = if step.prerequisites().is_empty() {
            String::new()
        } else {
            format!(" after {}", step.prerequisites().join(", "))
        };
        println!(
            "  {} {:<6} {} {}{}",
            format!("{:>2}/{total}", i + 1).dimmed(),
            marker,
            step.id().bold(),
            format!("({})", step.kind()).dimmed(),
            requires.dimmed()
        );
    }

    let pending = preview
        .iter()
        .filter(|(_, action)| *action == DryRunAction::Run)
        .count();
    println!();
    if pending == 0 {
        ui::success(&format!("All {total} steps already succeeded"));
    } else {
        ui::info(&format!("{pending} of {total} steps would run"));
    }
    Ok(())
}
