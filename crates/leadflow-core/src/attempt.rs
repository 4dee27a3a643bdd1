//! Outreach attempt data model.
//!
//! An `OutreachAttempt` is created `Pending` by the scheduler before a
//! dispatcher is called, then moved to `Sent` or `Failed` once the dispatcher
//! answers. A lead has at most one `Pending` attempt per channel.

use crate::types::Channel;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// AttemptStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of an attempt.
///
/// Transitions: `Pending → Sent | Failed | Cancelled`, and
/// `Cancelled → Sent | Failed` when the dispatcher was already holding the
/// attempt as the opt-out landed.
///
/// A cancel before dispatch returns the counter slot (`slot_released`). An
/// opt-out cancel keeps it, since the dispatcher may be sending. A pending
/// attempt left behind by an interrupted run is recovered to `Failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AttemptStatus {
    Pending,
    Sent {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider_ref: Option<String>,
    },
    Failed {
        reason: String,
    },
    Cancelled {
        reason: String,
        #[serde(default)]
        slot_released: bool,
    },
}

impl AttemptStatus {
    pub fn label(&self) -> &'static str {
        match self {
            AttemptStatus::Pending => "pending",
            AttemptStatus::Sent { .. } => "sent",
            AttemptStatus::Failed { .. } => "failed",
            AttemptStatus::Cancelled { .. } => "cancelled",
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, AttemptStatus::Pending)
    }

    /// Whether the attempt used up its sequence step. Sent and failed steps
    /// both count; the next step follows rather than retrying the same one.
    pub fn consumes_step(&self) -> bool {
        matches!(
            self,
            AttemptStatus::Sent { .. } | AttemptStatus::Failed { .. }
        )
    }
}

// ---------------------------------------------------------------------------
// OutreachAttempt
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutreachAttempt {
    pub id: Uuid,
    pub lead_id: u64,
    pub step_index: u32,
    pub channel: Channel,
    /// Moment the attempt was reserved for dispatch. Step delays count from here.
    pub sent_at: DateTime<Utc>,
    /// Day whose channel counter this attempt consumed.
    pub counted_day: NaiveDate,
    pub status: AttemptStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Set when the outcome arrived after the attempt was cancelled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl OutreachAttempt {
    pub fn new_pending(
        lead_id: u64,
        channel: Channel,
        step_index: u32,
        day: NaiveDate,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            lead_id,
            step_index,
            channel,
            sent_at: now,
            counted_day: day,
            status: AttemptStatus::Pending,
            subject: None,
            content: None,
            note: None,
            updated_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// OptOut
// ---------------------------------------------------------------------------

/// Stop request from a lead. `channel: None` stops every channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptOut {
    pub lead_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<Channel>,
    pub reason: String,
    pub at: DateTime<Utc>,
}

impl OptOut {
    pub fn covers(&self, channel: Channel) -> bool {
        match self.channel {
            Some(c) => c == channel,
            None => true,
        }
    }
}
