//! Lead store: persisted leads, engagement history, outreach attempts,
//! opt-outs and daily counters in a single redb file.
//!
//! Every operation that touches more than one row runs in one redb write
//! transaction, so a lead is never half-inserted, an event is never counted
//! without its de-duplication key, and a dispatch slot is never taken
//! without its pending attempt being recorded.

pub mod db;

use crate::attempt::{OptOut, OutreachAttempt};
use crate::types::{Channel, LeadStage};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

pub use db::LeadStore;

/// Everything needed to claim one dispatch slot for a sequence step.
#[derive(Debug, Clone)]
pub struct ReserveRequest {
    pub lead_id: u64,
    pub channel: Channel,
    pub step_index: u32,
    pub day: NaiveDate,
    pub cap: u32,
    pub subject: Option<String>,
    pub content: String,
    pub now: DateTime<Utc>,
}

/// Outcome of [`LeadStore::reserve`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reservation {
    /// Counter incremented and a `Pending` attempt recorded.
    Reserved(OutreachAttempt),
    /// The channel's cap for the day is used up. Nothing changed.
    CapReached { used: u32, cap: u32 },
    /// The lead opted out of this channel.
    Stopped(OptOut),
    /// Another attempt on this channel is still waiting for its dispatcher.
    AlreadyPending { attempt_id: Uuid },
    /// This step (or a later one) was already attempted.
    StepTaken,
    /// The lead is a customer or lost.
    LeadClosed { stage: LeadStage },
}

/// Result of [`LeadStore::opt_out`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptOutResult {
    pub opt_out: OptOut,
    /// Pending attempts the opt-out cancelled.
    pub cancelled: Vec<OutreachAttempt>,
}
