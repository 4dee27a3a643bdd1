use crate::output::{fmt_time, print_json, print_table};
use leadflow_core::scheduler::{SchedulePolicy, Scheduler};
use std::path::Path;

pub fn run(root: &Path, now: Option<&str>, json: bool) -> anyhow::Result<()> {
    let now = super::parse_now(now)?;
    let project = super::open(root)?;
    let catalog = project.config.catalog();
    let policy = SchedulePolicy::from_config(&project.config)?;
    let scheduler = Scheduler::new(&project.store, &catalog, policy);
    let due = scheduler.plan(now)?;

    if json {
        return print_json(&due);
    }
    if due.is_empty() {
        println!("Nothing due.");
        return Ok(());
    }
    let rows = due
        .iter()
        .map(|d| {
            vec![
                d.channel.to_string(),
                d.lead_id.to_string(),
                d.business_name.clone(),
                d.step_index.to_string(),
                d.tier.to_string(),
                fmt_time(d.due_at),
                d.to.clone(),
            ]
        })
        .collect();
    print_table(&["CHANNEL", "LEAD", "BUSINESS", "STEP", "TIER", "DUE", "TO"], rows);
    Ok(())
}
