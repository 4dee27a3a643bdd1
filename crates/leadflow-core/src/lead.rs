use crate::error::{LeadflowError, Result};
use crate::score;
use crate::types::{Channel, LeadStage, Tier};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

pub const DEFAULT_VERTICAL: &str = "general";

// ---------------------------------------------------------------------------
// Lead
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: u64,
    pub business_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    pub vertical: String,
    pub source: String,
    pub stage: LeadStage,
    /// Cached sum of engagement weights. Recomputable from the event log.
    pub score: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    pub fn from_new(id: u64, new: NewLead, now: DateTime<Utc>) -> Self {
        Self {
            id,
            business_name: new.business_name,
            owner_name: new.owner_name,
            email: new.email,
            phone: new.phone,
            website: new.website,
            city: new.city,
            state: new.state,
            vertical: new.vertical.unwrap_or_else(|| DEFAULT_VERTICAL.to_string()),
            source: new.source.unwrap_or_else(|| "manual".to_string()),
            stage: LeadStage::New,
            score: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn tier(&self) -> Tier {
        score::tier_for(self.score)
    }

    /// Address used to reach this lead on `channel`. SMS and calls share the phone.
    pub fn contact_for(&self, channel: Channel) -> Option<&str> {
        match channel {
            Channel::Email => self.email.as_deref(),
            Channel::Sms | Channel::Call => self.phone.as_deref(),
        }
    }

    pub fn first_name(&self) -> &str {
        self.owner_name
            .as_deref()
            .and_then(|n| n.split_whitespace().next())
            .unwrap_or("there")
    }

    /// Advance the stage, never moving backward and never leaving a terminal stage.
    pub fn promote(&mut self, to: LeadStage, now: DateTime<Utc>) -> bool {
        if self.stage.is_terminal() || to.is_terminal() || to <= self.stage {
            return false;
        }
        self.stage = to;
        self.updated_at = now;
        true
    }
}

pub(crate) fn contact_keys(email: Option<&str>, phone: Option<&str>) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(e) = email {
        keys.push(format!("email:{e}"));
    }
    if let Some(p) = phone {
        keys.push(format!("phone:{p}"));
    }
    keys
}

// ---------------------------------------------------------------------------
// NewLead
// ---------------------------------------------------------------------------

/// A lead as it arrives from a scraper, importer or the CLI.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewLead {
    pub business_name: String,
    #[serde(default)]
    pub owner_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub vertical: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

static EMAIL_RE: OnceLock<Regex> = OnceLock::new();

fn email_re() -> &'static Regex {
    EMAIL_RE.get_or_init(|| {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex is valid")
    })
}

fn clean(field: Option<String>) -> Option<String> {
    field
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Normalise a phone number to `+<digits>`. Ten-digit numbers get the `+1`
/// country prefix.
fn normalize_phone(raw: &str) -> Result<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    let has_plus = raw.trim_start().starts_with('+');
    if !(7..=15).contains(&digits.len()) {
        return Err(LeadflowError::InvalidLead(format!("invalid phone '{raw}'")));
    }
    if !has_plus && digits.len() == 10 {
        return Ok(format!("+1{digits}"));
    }
    Ok(format!("+{digits}"))
}

impl NewLead {
    /// Trim, normalise and validate. A lead needs a business name and at
    /// least one usable contact channel.
    pub fn normalized(self) -> Result<NewLead> {
        let business_name = self.business_name.trim().to_string();
        if business_name.is_empty() {
            return Err(LeadflowError::InvalidLead(
                "business name is required".to_string(),
            ));
        }

        let email = match clean(self.email) {
            Some(e) => {
                let e = e.to_lowercase();
                if !email_re().is_match(&e) {
                    return Err(LeadflowError::InvalidLead(format!("invalid email '{e}'")));
                }
                Some(e)
            }
            None => None,
        };
        let phone = match clean(self.phone) {
            Some(p) => Some(normalize_phone(&p)?),
            None => None,
        };
        if email.is_none() && phone.is_none() {
            return Err(LeadflowError::InvalidLead(format!(
                "'{business_name}' has no contact channel"
            )));
        }

        Ok(NewLead {
            business_name,
            owner_name: clean(self.owner_name),
            email,
            phone,
            website: clean(self.website),
            city: clean(self.city),
            state: clean(self.state),
            vertical: clean(self.vertical).map(|v| v.to_lowercase()),
            source: clean(self.source),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
