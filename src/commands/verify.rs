//! `verify` - re-check the effects of succeeded steps

use anyhow::Result;
use colored::Colorize;
use plankit::{FileStateRecorder, Plan, StateRecorder};

use crate::Context;
use crate::hooks;
use crate::progress;
use crate::ui;

pub fn run(ctx: &Context) -> Result<()> {
    let loaded = super::load_plan(ctx)?;
    let state = FileStateRecorder::open(ctx.state_file());
    check(ctx, &loaded.plan, &state)
}

/// Run every hook and print one line per check
///
/// Failing checks turn into [`plankit::RunError::VerificationFailed`];
/// recorded state is left as is.
pub fn check(ctx: &Context, plan: &Plan, state: &dyn StateRecorder) -> Result<()> {
    let spinner = (!ctx.quiet).then(|| progress::spinner("Verifying..."));
    let report = hooks::verifier(ctx.env_file()).verify(plan, &state.all_records());
    if let Some(pb) = &spinner {
        progress::finish_clear(pb);
    }

    if report.is_empty() {
        if !ctx.quiet {
            ui::dim("No verification checks declared");
        }
        return Ok(());
    }

    ui::section("Verification");
    for (name, outcome) in report.checks() {
        if outcome.passed {
            if !ctx.quiet {
                println!("  {} {} {}", "✓".green(), name, outcome.detail.dimmed());
            }
        } else {
            println!("  {} {} {}", "✗".red(), name, outcome.detail.red());
        }
    }

    let passed = report.checks().values().filter(|o| o.passed).count();
    let total = report.len();
    report.into_result()?;
    println!();
    ui::success(&format!("{passed}/{total} checks passed"));
    Ok(())
}
