pub mod apply;
pub mod plan;
pub mod reset;
pub mod status;
pub mod verify;

use anyhow::Result;
use plankit::{Plan, RunError, compile};

use crate::Context;
use crate::schema::PlanFile;

/// A plan file together with its compiled execution order
pub struct LoadedPlan {
    pub name: String,
    pub plan: Plan,
}

/// Read and compile the plan file named on the command line
///
/// Compile errors are returned as [`RunError::Compile`] so they map to their
/// own exit code.
pub fn load_plan(ctx: &Context) -> Result<LoadedPlan> {
    let file = PlanFile::load(&ctx.plan_path)?;
    let name = file.display_name(&ctx.plan_path);
    let plan = compile(file.steps).map_err(RunError::from)?;
    log::debug!("Compiled {} steps from {}", plan.len(), ctx.plan_path.display());
    Ok(LoadedPlan { name, plan })
}
