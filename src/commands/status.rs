//! `status` - show recorded step outcomes

use anyhow::{Context as _, Result};
use chrono::{DateTime, Local, Utc};
use colored::Colorize;
use plankit::{FileStateRecorder, StateRecorder, StepStatus};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::Context;
use crate::ui;

#[derive(Debug, Serialize)]
struct StepRow {
    id: String,
    kind: Option<String>,
    status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    /// Recorded but no longer in the plan
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stale: bool,
}

pub fn run(ctx: &Context, json: bool) -> Result<()> {
    let loaded = super::load_plan(ctx)?;
    let state = FileStateRecorder::open(ctx.state_file());
    let mut records: BTreeMap<_, _> = state
        .all_records()
        .into_iter()
        .map(|r| (r.id.clone(), r))
        .collect();

    let mut rows: Vec<StepRow> = loaded
        .plan
        .iter()
        .map(|step| {
            let record = records.remove(step.id());
            StepRow {
                id: step.id().to_string(),
                kind: Some(step.kind().to_string()),
                status: record.as_ref().map_or(StepStatus::Pending, |r| r.status),
                updated: record.as_ref().map(|r| r.timestamp),
                error: record.and_then(|r| r.error),
                stale: false,
            }
        })
        .collect();
    rows.extend(records.into_values().map(|r| StepRow {
        id: r.id,
        kind: None,
        status: r.status,
        updated: Some(r.timestamp),
        error: r.error,
        stale: true,
    }));

    if json {
        let out = serde_json::to_string_pretty(&rows).context("Failed to serialize status")?;
        println!("{out}");
        return Ok(());
    }

    ui::header(&format!("Status: {}", loaded.name));
    for row in &rows {
        let when = row
            .updated
            .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        let label = if row.stale {
            format!("{} (not in plan)", row.id)
        } else {
            row.id.clone()
        };
        println!(
            "  {:<32} {:<10} {}",
            label,
            ui::status_label(row.status),
            when.dimmed()
        );
        if let Some(error) = &row.error {
            ui::dim(&ui::truncate(error, 100));
        }
    }

    let done = rows
        .iter()
        .filter(|r| !r.stale && r.status == StepStatus::Succeeded)
        .count();
    println!();
    ui::info(&format!("{done}/{} steps succeeded", loaded.plan.len()));
    Ok(())
}
