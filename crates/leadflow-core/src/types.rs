use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::LeadflowError;

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Sms,
    Call,
}

impl Channel {
    pub fn all() -> &'static [Channel] {
        &[Channel::Email, Channel::Sms, Channel::Call]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Sms => "sms",
            Channel::Call => "call",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Channel {
    type Err = LeadflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Channel::Email),
            "sms" => Ok(Channel::Sms),
            "call" => Ok(Channel::Call),
            _ => Err(LeadflowError::InvalidChannel(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// LeadStage
// ---------------------------------------------------------------------------

/// Lifecycle stage of a lead.
///
/// Ordering follows the funnel: `New < Contacted < Engaged < Hot`. The two
/// outcomes `Customer` and `Lost` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStage {
    New,
    Contacted,
    Engaged,
    Hot,
    Customer,
    Lost,
}

impl LeadStage {
    pub fn all() -> &'static [LeadStage] {
        &[
            LeadStage::New,
            LeadStage::Contacted,
            LeadStage::Engaged,
            LeadStage::Hot,
            LeadStage::Customer,
            LeadStage::Lost,
        ]
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, LeadStage::Customer | LeadStage::Lost)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LeadStage::New => "new",
            LeadStage::Contacted => "contacted",
            LeadStage::Engaged => "engaged",
            LeadStage::Hot => "hot",
            LeadStage::Customer => "customer",
            LeadStage::Lost => "lost",
        }
    }
}

impl fmt::Display for LeadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LeadStage {
    type Err = LeadflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(LeadStage::New),
            "contacted" => Ok(LeadStage::Contacted),
            "engaged" => Ok(LeadStage::Engaged),
            "hot" => Ok(LeadStage::Hot),
            "customer" => Ok(LeadStage::Customer),
            "lost" => Ok(LeadStage::Lost),
            _ => Err(LeadflowError::InvalidStage(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// EventKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    EmailOpen,
    LinkClick,
    Reply,
    CallAnswered,
    SiteVisit,
}

impl EventKind {
    pub fn all() -> &'static [EventKind] {
        &[
            EventKind::EmailOpen,
            EventKind::LinkClick,
            EventKind::Reply,
            EventKind::CallAnswered,
            EventKind::SiteVisit,
        ]
    }

    /// Fixed score contribution of one event of this kind.
    pub fn weight(self) -> u32 {
        match self {
            EventKind::EmailOpen => 5,
            EventKind::LinkClick => 10,
            EventKind::Reply => 25,
            EventKind::CallAnswered => 15,
            EventKind::SiteVisit => 20,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::EmailOpen => "email_open",
            EventKind::LinkClick => "link_click",
            EventKind::Reply => "reply",
            EventKind::CallAnswered => "call_answered",
            EventKind::SiteVisit => "site_visit",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventKind {
    type Err = LeadflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email_open" | "open" => Ok(EventKind::EmailOpen),
            "link_click" | "click" => Ok(EventKind::LinkClick),
            "reply" => Ok(EventKind::Reply),
            "call_answered" => Ok(EventKind::CallAnswered),
            "site_visit" => Ok(EventKind::SiteVisit),
            _ => Err(LeadflowError::InvalidEventKind(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Tier
// ---------------------------------------------------------------------------

/// Coarse engagement bucket. Ordered so that `Hot` is the greatest.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    #[default]
    Cold,
    Warm,
    Hot,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Cold => "cold",
            Tier::Warm => "warm",
            Tier::Hot => "hot",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Tier {
    type Err = LeadflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cold" => Ok(Tier::Cold),
            "warm" => Ok(Tier::Warm),
            "hot" => Ok(Tier::Hot),
            _ => Err(LeadflowError::InvalidTier(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
