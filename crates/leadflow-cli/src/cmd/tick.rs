use crate::output::{print_json, print_table};
use anyhow::Context;
use leadflow_core::{
    dispatch::{Dispatcher, DryRunDispatcher, RelayDispatcher},
    scheduler::{SchedulePolicy, Scheduler, TickEntry},
};
use std::path::Path;

pub fn run(root: &Path, dry_run: bool, now: Option<&str>, json: bool) -> anyhow::Result<()> {
    let now = super::parse_now(now)?;
    let project = super::open(root)?;

    let dispatcher: Box<dyn Dispatcher> = if dry_run {
        Box::new(DryRunDispatcher)
    } else {
        let relay = project.config.relay.as_ref().context(
            "no relay configured: set relay.url in .leadflow/config.yaml or pass --dry-run",
        )?;
        Box::new(RelayDispatcher::new(relay)?)
    };

    let catalog = project.config.catalog();
    let policy = SchedulePolicy::from_config(&project.config)?;
    let scheduler = Scheduler::new(&project.store, &catalog, policy);
    let report = scheduler
        .tick(now, dispatcher.as_ref())
        .context("tick failed")?;

    if json {
        return print_json(&report);
    }

    println!(
        "Tick {}{}: {} sent, {} failed, {} deferred, {} cancelled",
        report.day,
        if dry_run { " (dry run)" } else { "" },
        report.sent.len(),
        report.failed.len(),
        report.deferred.len(),
        report.cancelled.len()
    );
    if !report.recovered.is_empty() {
        println!("  recovered {} interrupted attempt(s)", report.recovered.len());
    }

    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut push = |outcome: &str, entries: &[TickEntry]| {
        for e in entries {
            rows.push(vec![
                e.lead_id.to_string(),
                e.channel.to_string(),
                e.step_index.to_string(),
                outcome.to_string(),
                e.detail.clone().unwrap_or_default(),
            ]);
        }
    };
    push("sent", &report.sent);
    push("failed", &report.failed);
    push("cancelled", &report.cancelled);
    for d in &report.deferred {
        rows.push(vec![
            d.lead_id.to_string(),
            d.channel.to_string(),
            d.step_index.to_string(),
            "deferred".to_string(),
            format!("until {}", d.until.format("%Y-%m-%d %H:%M UTC")),
        ]);
    }
    if !rows.is_empty() {
        println!();
        print_table(&["LEAD", "CHANNEL", "STEP", "OUTCOME", "DETAIL"], rows);
    }
    Ok(())
}
