use crate::output::{fmt_time, or_dash, print_json, print_table};
use anyhow::Context;
use chrono::Utc;
use clap::Subcommand;
use leadflow_core::{
    import,
    lead::{Lead, NewLead},
    scheduler::{SchedulePolicy, Scheduler},
    types::{Channel, LeadStage, Tier},
};
use std::path::{Path, PathBuf};

#[derive(Subcommand)]
pub enum LeadSubcommand {
    /// Add a single lead
    Add {
        /// Business name
        #[arg(required = true)]
        business_name: Vec<String>,
        #[arg(long)]
        owner: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        website: Option<String>,
        #[arg(long)]
        city: Option<String>,
        #[arg(long)]
        state: Option<String>,
        /// Business vertical (e.g. hvac, plumber, dental)
        #[arg(long)]
        vertical: Option<String>,
        /// Where the lead came from (default: manual)
        #[arg(long)]
        source: Option<String>,
    },
    /// List leads
    List {
        /// Only leads in this stage
        #[arg(long)]
        stage: Option<String>,
        /// Only leads in this vertical
        #[arg(long)]
        vertical: Option<String>,
        /// Only leads in this tier (cold, warm, hot)
        #[arg(long)]
        tier: Option<String>,
    },
    /// Show a lead with its events, attempts and per-channel sequence state
    Show { id: u64 },
    /// Close a lead as customer or lost
    Stage { id: u64, stage: String },
    /// Highest-scoring open leads
    Hot {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Import leads from a YAML/JSON file or pipe-delimited lines
    Import { path: PathBuf },
}

pub fn run(root: &Path, subcmd: LeadSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        LeadSubcommand::Add {
            business_name,
            owner,
            email,
            phone,
            website,
            city,
            state,
            vertical,
            source,
        } => {
            let new = NewLead {
                business_name: business_name.join(" "),
                owner_name: owner,
                email,
                phone,
                website,
                city,
                state,
                vertical,
                source,
            };
            add(root, new, json)
        }
        LeadSubcommand::List {
            stage,
            vertical,
            tier,
        } => list(root, stage.as_deref(), vertical.as_deref(), tier.as_deref(), json),
        LeadSubcommand::Show { id } => show(root, id, json),
        LeadSubcommand::Stage { id, stage } => set_stage(root, id, &stage, json),
        LeadSubcommand::Hot { limit } => hot(root, limit, json),
        LeadSubcommand::Import { path } => import_leads(root, &path, json),
    }
}

// ---------------------------------------------------------------------------
// add
// ---------------------------------------------------------------------------

fn add(root: &Path, new: NewLead, json: bool) -> anyhow::Result<()> {
    let project = super::open(root)?;
    let lead = project
        .store
        .insert_lead(new, Utc::now())
        .context("failed to add lead")?;
    if json {
        return print_json(&lead);
    }
    println!("Added lead {}: {}", lead.id, lead.business_name);
    Ok(())
}

// ---------------------------------------------------------------------------
// list / hot
// ---------------------------------------------------------------------------

fn lead_rows(leads: &[Lead]) -> Vec<Vec<String>> {
    leads
        .iter()
        .map(|l| {
            vec![
                l.id.to_string(),
                l.business_name.clone(),
                l.vertical.clone(),
                l.stage.to_string(),
                l.score.to_string(),
                l.tier().to_string(),
                or_dash(l.email.as_deref()),
                or_dash(l.phone.as_deref()),
            ]
        })
        .collect()
}

const LEAD_HEADERS: [&str; 8] = ["ID", "BUSINESS", "VERTICAL", "STAGE", "SCORE", "TIER", "EMAIL", "PHONE"];

fn list(
    root: &Path,
    stage: Option<&str>,
    vertical: Option<&str>,
    tier: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let stage: Option<LeadStage> = stage.map(str::parse).transpose()?;
    let tier: Option<Tier> = tier.map(str::parse).transpose()?;
    let vertical = vertical.map(str::to_lowercase);

    let project = super::open(root)?;
    let leads: Vec<Lead> = project
        .store
        .list_leads()?
        .into_iter()
        .filter(|l| stage.map_or(true, |s| l.stage == s))
        .filter(|l| tier.map_or(true, |t| l.tier() == t))
        .filter(|l| vertical.as_deref().map_or(true, |v| l.vertical == v))
        .collect();

    if json {
        return print_json(&leads);
    }
    if leads.is_empty() {
        println!("No leads.");
        return Ok(());
    }
    print_table(&LEAD_HEADERS, lead_rows(&leads));
    Ok(())
}

fn hot(root: &Path, limit: usize, json: bool) -> anyhow::Result<()> {
    let project = super::open(root)?;
    let leads = project.store.hot_leads(limit)?;
    if json {
        return print_json(&leads);
    }
    if leads.is_empty() {
        println!("No open leads.");
        return Ok(());
    }
    print_table(&LEAD_HEADERS, lead_rows(&leads));
    Ok(())
}

// ---------------------------------------------------------------------------
// show
// ---------------------------------------------------------------------------

fn show(root: &Path, id: u64, json: bool) -> anyhow::Result<()> {
    let project = super::open(root)?;
    let lead = project.store.get_lead(id)?;
    let events = project.store.events_for(id)?;
    let attempts = project.store.attempts_for(id)?;

    let catalog = project.config.catalog();
    let policy = SchedulePolicy::from_config(&project.config)?;
    let scheduler = Scheduler::new(&project.store, &catalog, policy);
    let mut channels = Vec::new();
    for &ch in Channel::all() {
        channels.push((ch, scheduler.channel_state(&lead, ch)?));
    }

    if json {
        let states: serde_json::Map<String, serde_json::Value> = channels
            .iter()
            .map(|(ch, st)| Ok((ch.to_string(), serde_json::to_value(st)?)))
            .collect::<Result<_, serde_json::Error>>()?;
        return print_json(&serde_json::json!({
            "lead": lead,
            "tier": lead.tier(),
            "channels": states,
            "events": events,
            "attempts": attempts,
        }));
    }

    println!("Lead {}: {}", lead.id, lead.business_name);
    if let Some(owner) = &lead.owner_name {
        println!("  owner:    {owner}");
    }
    println!("  email:    {}", or_dash(lead.email.as_deref()));
    println!("  phone:    {}", or_dash(lead.phone.as_deref()));
    let place: Vec<&str> = [lead.city.as_deref(), lead.state.as_deref()]
        .into_iter()
        .flatten()
        .collect();
    if !place.is_empty() {
        println!("  location: {}", place.join(", "));
    }
    println!("  vertical: {}", lead.vertical);
    println!("  source:   {}", lead.source);
    println!("  stage:    {}", lead.stage);
    println!("  score:    {} ({})", lead.score, lead.tier());
    println!("  added:    {}", fmt_time(lead.created_at));

    println!();
    println!("Sequences:");
    for (ch, state) in &channels {
        println!("  {:<6} {}", ch.to_string(), serde_json::to_string(state)?);
    }

    if !events.is_empty() {
        println!();
        println!("Events ({}):", events.len());
        for e in &events {
            println!("  {}  {:<14} +{}", fmt_time(e.occurred_at), e.kind.to_string(), e.weight);
        }
    }

    if !attempts.is_empty() {
        println!();
        println!("Attempts ({}):", attempts.len());
        for a in &attempts {
            println!(
                "  {}  {:<6} step {:<2} {}",
                fmt_time(a.sent_at),
                a.channel.to_string(),
                a.step_index,
                a.status.label()
            );
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// stage
// ---------------------------------------------------------------------------

fn set_stage(root: &Path, id: u64, stage: &str, json: bool) -> anyhow::Result<()> {
    let stage: LeadStage = stage.parse()?;
    let project = super::open(root)?;
    let lead = project
        .store
        .set_stage(id, stage, Utc::now())
        .context("failed to set stage")?;
    if json {
        return print_json(&lead);
    }
    println!("Lead {} is now {}", lead.id, lead.stage);
    Ok(())
}

// ---------------------------------------------------------------------------
// import
// ---------------------------------------------------------------------------

fn import_leads(root: &Path, path: &Path, json: bool) -> anyhow::Result<()> {
    let project = super::open(root)?;
    let report = import::import_file(&project.store, path, Utc::now())
        .with_context(|| format!("failed to import {}", path.display()))?;
    if json {
        return print_json(&report);
    }
    println!(
        "Imported {} leads, skipped {}",
        report.added,
        report.skipped.len()
    );
    for s in &report.skipped {
        println!("  row {}: {}", s.position, s.reason);
    }
    Ok(())
}
