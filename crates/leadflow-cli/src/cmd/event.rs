use crate::output::{fmt_time, or_dash, print_json, print_table};
use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Subcommand;
use leadflow_core::{
    event::{NewEvent, RecordOutcome},
    types::EventKind,
};
use std::path::Path;

#[derive(Subcommand)]
pub enum EventSubcommand {
    /// Record an engagement callback (open, click, reply, call_answered, site_visit)
    Record {
        lead_id: u64,
        kind: String,
        /// Provider's event id; repeats are ignored
        #[arg(long = "provider-id")]
        provider_id: Option<String>,
        /// When it happened (RFC 3339, default now)
        #[arg(long)]
        at: Option<String>,
    },
    /// List a lead's engagement events by occurrence time
    List { lead_id: u64 },
}

pub fn run(root: &Path, subcmd: EventSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        EventSubcommand::Record {
            lead_id,
            kind,
            provider_id,
            at,
        } => record(root, lead_id, &kind, provider_id, at.as_deref(), json),
        EventSubcommand::List { lead_id } => list(root, lead_id, json),
    }
}

fn record(
    root: &Path,
    lead_id: u64,
    kind: &str,
    provider_id: Option<String>,
    at: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let kind: EventKind = kind.parse()?;
    let occurred_at = at
        .map(|s| {
            DateTime::parse_from_rfc3339(s)
                .map(|t| t.with_timezone(&Utc))
                .with_context(|| format!("invalid --at '{s}', expected RFC 3339"))
        })
        .transpose()?;

    let project = super::open(root)?;
    let outcome = project.store.record_event(
        NewEvent {
            lead_id,
            kind,
            occurred_at,
            provider_event_id: provider_id,
        },
        Utc::now(),
    )?;

    if json {
        return print_json(&outcome);
    }
    match outcome {
        RecordOutcome::Recorded { event, score } => {
            let lead = project.store.get_lead(lead_id)?;
            println!(
                "Recorded {} (+{}) for lead {lead_id}: score {score}, {} ({})",
                event.kind,
                event.weight,
                lead.tier(),
                lead.stage
            );
        }
        RecordOutcome::Duplicate { provider_event_id } => {
            println!("Duplicate event '{provider_event_id}' ignored");
        }
    }
    Ok(())
}

fn list(root: &Path, lead_id: u64, json: bool) -> anyhow::Result<()> {
    let project = super::open(root)?;
    project.store.get_lead(lead_id)?;
    let events = project.store.events_for(lead_id)?;
    if json {
        return print_json(&events);
    }
    if events.is_empty() {
        println!("No events for lead {lead_id}.");
        return Ok(());
    }
    let rows = events
        .iter()
        .map(|e| {
            vec![
                fmt_time(e.occurred_at),
                e.kind.to_string(),
                e.weight.to_string(),
                or_dash(e.provider_event_id.as_deref()),
            ]
        })
        .collect();
    print_table(&["OCCURRED", "KIND", "WEIGHT", "PROVIDER ID"], rows);
    Ok(())
}
