//! `reset` - forget recorded outcomes

use anyhow::Result;
use plankit::FileStateRecorder;

use crate::Context;
use crate::ui;

pub fn run(ctx: &Context, steps: &[String], all: bool) -> Result<()> {
    let mut state = FileStateRecorder::open(ctx.state_file());

    if all {
        state.clear()?;
        ctx.env_file().clear()?;
        ui::success("Forgot every recorded step and persisted environment variable");
        return Ok(());
    }

    for id in steps {
        if state.forget(id)? {
            ui::success(&format!("Forgot {id}"));
        } else {
            ui::warn(&format!("No record for {id}"));
        }
    }
    Ok(())
}
