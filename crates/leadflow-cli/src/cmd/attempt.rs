use crate::output::{fmt_time, print_json, print_table};
use clap::Subcommand;
use leadflow_core::{attempt::AttemptStatus, types::Channel};
use std::path::Path;

#[derive(Subcommand)]
pub enum AttemptSubcommand {
    /// List outreach attempts, newest first
    List {
        /// Only attempts for this lead
        #[arg(long)]
        lead: Option<u64>,
        /// Only attempts on this channel
        #[arg(long)]
        channel: Option<String>,
        /// Only attempts in this status (pending, sent, failed, cancelled)
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
}

pub fn run(root: &Path, subcmd: AttemptSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        AttemptSubcommand::List {
            lead,
            channel,
            status,
            limit,
        } => list(root, lead, channel.as_deref(), status.as_deref(), limit, json),
    }
}

fn list(
    root: &Path,
    lead: Option<u64>,
    channel: Option<&str>,
    status: Option<&str>,
    limit: usize,
    json: bool,
) -> anyhow::Result<()> {
    let channel: Option<Channel> = channel.map(str::parse).transpose()?;
    if let Some(s) = status {
        if !["pending", "sent", "failed", "cancelled"].contains(&s) {
            anyhow::bail!("unknown status '{s}': expected pending, sent, failed or cancelled");
        }
    }

    let project = super::open(root)?;
    let mut attempts = match lead {
        Some(id) => {
            let mut a = project.store.attempts_for(id)?;
            a.reverse();
            a
        }
        None => project.store.list_attempts()?,
    };
    attempts.retain(|a| {
        channel.map_or(true, |c| a.channel == c) && status.map_or(true, |s| a.status.label() == s)
    });
    attempts.truncate(limit);

    if json {
        return print_json(&attempts);
    }
    if attempts.is_empty() {
        println!("No attempts.");
        return Ok(());
    }
    let rows = attempts
        .iter()
        .map(|a| {
            let detail = match &a.status {
                AttemptStatus::Sent { provider_ref } => a
                    .note
                    .clone()
                    .or_else(|| provider_ref.clone())
                    .unwrap_or_default(),
                AttemptStatus::Failed { reason } | AttemptStatus::Cancelled { reason, .. } => {
                    reason.clone()
                }
                AttemptStatus::Pending => String::new(),
            };
            vec![
                fmt_time(a.sent_at),
                a.lead_id.to_string(),
                a.channel.to_string(),
                a.step_index.to_string(),
                a.status.label().to_string(),
                detail,
            ]
        })
        .collect();
    print_table(&["SENT", "LEAD", "CHANNEL", "STEP", "STATUS", "DETAIL"], rows);
    Ok(())
}
