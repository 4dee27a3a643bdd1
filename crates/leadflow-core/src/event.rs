//! Engagement events: the append-only audit trail a lead's score is derived from.

use crate::types::EventKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One engagement signal for a lead. Never mutated or deleted once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngagementEvent {
    pub id: Uuid,
    pub lead_id: u64,
    pub kind: EventKind,
    pub weight: u32,
    /// When the engagement happened according to the provider.
    pub occurred_at: DateTime<Utc>,
    /// When the callback reached us. May be later than `occurred_at`, and
    /// callbacks may arrive in any order.
    pub recorded_at: DateTime<Utc>,
    /// Provider-assigned id used to drop duplicate deliveries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_event_id: Option<String>,
}

impl EngagementEvent {
    pub fn new(lead_id: u64, kind: EventKind, occurred_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            lead_id,
            kind,
            weight: kind.weight(),
            occurred_at,
            recorded_at: Utc::now(),
            provider_event_id: None,
        }
    }
}

/// An incoming engagement callback before it is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    pub lead_id: u64,
    pub kind: EventKind,
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub provider_event_id: Option<String>,
}

impl NewEvent {
    pub fn into_event(self, now: DateTime<Utc>) -> EngagementEvent {
        let mut event = EngagementEvent::new(self.lead_id, self.kind, self.occurred_at.unwrap_or(now));
        event.recorded_at = now;
        event.provider_event_id = self
            .provider_event_id
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());
        event
    }
}

/// Result of appending an engagement callback.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecordOutcome {
    Recorded {
        event: EngagementEvent,
        score: u32,
    },
    /// The provider event id was already seen; nothing changed.
    Duplicate { provider_event_id: String },
}
