use crate::counter::{Caps, DailyUsage};
use crate::error::Result;
use crate::store::LeadStore;
use crate::types::{Channel, LeadStage, Tier};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

/// Snapshot of the pipeline, with `day`'s channel usage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineStats {
    pub total_leads: usize,
    pub by_stage: BTreeMap<LeadStage, usize>,
    pub by_vertical: BTreeMap<String, usize>,
    pub by_tier: BTreeMap<Tier, usize>,
    pub today: Vec<DailyUsage>,
    pub opted_out: usize,
    /// Customers as a percentage of all leads.
    pub conversion_rate: f64,
}

pub fn pipeline_stats(store: &LeadStore, day: NaiveDate, caps: &Caps) -> Result<PipelineStats> {
    let leads = store.list_leads()?;

    let mut by_stage = BTreeMap::new();
    let mut by_vertical = BTreeMap::new();
    let mut by_tier = BTreeMap::new();
    for lead in &leads {
        *by_stage.entry(lead.stage).or_insert(0) += 1;
        *by_vertical.entry(lead.vertical.clone()).or_insert(0) += 1;
        *by_tier.entry(lead.tier()).or_insert(0) += 1;
    }

    let today = Channel::all()
        .iter()
        .map(|&ch| store.usage(day, ch, caps.for_channel(ch)))
        .collect::<Result<Vec<_>>>()?;

    let mut opted: Vec<u64> = store.list_opt_outs()?.iter().map(|o| o.lead_id).collect();
    opted.sort_unstable();
    opted.dedup();

    let customers = by_stage.get(&LeadStage::Customer).copied().unwrap_or(0);
    let conversion_rate = if leads.is_empty() {
        0.0
    } else {
        customers as f64 / leads.len() as f64 * 100.0
    };

    Ok(PipelineStats {
        total_leads: leads.len(),
        by_stage,
        by_vertical,
        by_tier,
        today,
        opted_out: opted.len(),
        conversion_rate,
    })
}
