//! Scoring engine.
//!
//! A lead's score is the sum of the weights of its engagement events. The
//! computation is pure: the same event set always yields the same score, in
//! any order.

use crate::event::EngagementEvent;
use crate::types::Tier;
use serde::{Deserialize, Serialize};

pub const HOT_THRESHOLD: u32 = 50;
pub const WARM_THRESHOLD: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadScore {
    pub lead_id: u64,
    pub score: u32,
    pub tier: Tier,
    pub event_count: usize,
}

pub fn tier_for(score: u32) -> Tier {
    if score >= HOT_THRESHOLD {
        Tier::Hot
    } else if score >= WARM_THRESHOLD {
        Tier::Warm
    } else {
        Tier::Cold
    }
}

/// Sum of weights. Saturates rather than wrapping so appending never lowers it.
pub fn total<'a>(events: impl IntoIterator<Item = &'a EngagementEvent>) -> u32 {
    events
        .into_iter()
        .fold(0u32, |acc, e| acc.saturating_add(e.weight))
}

/// Score `lead_id` from its event history. Events for other leads are ignored.
pub fn compute(lead_id: u64, events: &[EngagementEvent]) -> LeadScore {
    let own: Vec<&EngagementEvent> = events.iter().filter(|e| e.lead_id == lead_id).collect();
    let score = total(own.iter().copied());
    LeadScore {
        lead_id,
        score,
        tier: tier_for(score),
        event_count: own.len(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
