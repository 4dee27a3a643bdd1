use crate::output::print_json;
use chrono::Utc;
use leadflow_core::types::Channel;
use std::path::Path;

pub fn run(
    root: &Path,
    lead_id: u64,
    channel: Option<&str>,
    reason: &str,
    json: bool,
) -> anyhow::Result<()> {
    let channel: Option<Channel> = channel.map(str::parse).transpose()?;
    let project = super::open(root)?;
    let result = project
        .store
        .opt_out(lead_id, channel, reason, Utc::now())?;

    if json {
        return print_json(&result);
    }
    let scope = channel.map(|c| c.to_string()).unwrap_or_else(|| "all channels".to_string());
    println!("Lead {lead_id} opted out of {scope}");
    if !result.cancelled.is_empty() {
        println!("  cancelled {} pending attempt(s)", result.cancelled.len());
    }
    Ok(())
}
