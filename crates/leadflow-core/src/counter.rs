//! Per-channel daily dispatch counters.
//!
//! Counters are scoped to a calendar day in the deployment's timezone and
//! live in the lead store's `counters` table, keyed `"<YYYY-MM-DD>:<channel>"`.
//! A new day simply starts a new key, which is the reset. Check-and-increment
//! only ever happens inside the same write transaction that records the
//! pending attempt.

use crate::error::{store_err, LeadflowError, Result};
use crate::types::Channel;
use chrono::{DateTime, Duration, FixedOffset, Local, NaiveDate, TimeZone, Utc};
use redb::{ReadableTable, Table, TableDefinition};
use serde::{Deserialize, Serialize};

pub(crate) const COUNTERS: TableDefinition<&str, u32> = TableDefinition::new("counters");

// ---------------------------------------------------------------------------
// Caps
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caps {
    #[serde(default = "default_email_cap")]
    pub email: u32,
    #[serde(default = "default_sms_cap")]
    pub sms: u32,
    #[serde(default = "default_call_cap")]
    pub call: u32,
}

fn default_email_cap() -> u32 {
    100
}

fn default_sms_cap() -> u32 {
    50
}

fn default_call_cap() -> u32 {
    50
}

impl Default for Caps {
    fn default() -> Self {
        Self {
            email: default_email_cap(),
            sms: default_sms_cap(),
            call: default_call_cap(),
        }
    }
}

impl Caps {
    pub fn for_channel(&self, channel: Channel) -> u32 {
        match channel {
            Channel::Email => self.email,
            Channel::Sms => self.sms,
            Channel::Call => self.call,
        }
    }
}

// ---------------------------------------------------------------------------
// DayClock
// ---------------------------------------------------------------------------

/// Maps instants to the calendar day counters are scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayClock {
    /// Host timezone.
    Local,
    Fixed(FixedOffset),
}

impl DayClock {
    pub fn from_offset_minutes(minutes: Option<i32>) -> Result<Self> {
        match minutes {
            None => Ok(DayClock::Local),
            Some(m) => FixedOffset::east_opt(m * 60)
                .map(DayClock::Fixed)
                .ok_or_else(|| LeadflowError::Config(format!("utc offset out of range: {m} minutes"))),
        }
    }

    pub fn day_of(&self, ts: DateTime<Utc>) -> NaiveDate {
        match self {
            DayClock::Local => ts.with_timezone(&Local).date_naive(),
            DayClock::Fixed(off) => ts.with_timezone(off).date_naive(),
        }
    }

    /// First instant of the day after the one containing `ts`.
    pub fn next_day_start(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let Some(next) = self.day_of(ts).succ_opt() else {
            return ts + Duration::days(1);
        };
        let midnight = next.and_hms_opt(0, 0, 0).unwrap_or_default();
        let start = match self {
            DayClock::Local => Local
                .from_local_datetime(&midnight)
                .earliest()
                .map(|t| t.with_timezone(&Utc)),
            DayClock::Fixed(off) => off
                .from_local_datetime(&midnight)
                .earliest()
                .map(|t| t.with_timezone(&Utc)),
        };
        start.unwrap_or(ts + Duration::days(1))
    }
}

// ---------------------------------------------------------------------------
// Counter table helpers
// ---------------------------------------------------------------------------

/// Usage of one channel's cap on one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyUsage {
    pub day: NaiveDate,
    pub channel: Channel,
    pub used: u32,
    pub cap: u32,
}

impl DailyUsage {
    pub fn remaining(&self) -> u32 {
        self.cap.saturating_sub(self.used)
    }
}

pub(crate) fn counter_key(day: NaiveDate, channel: Channel) -> String {
    format!("{}:{}", day.format("%Y-%m-%d"), channel)
}

pub(crate) fn read(table: &impl ReadableTable<&'static str, u32>, key: &str) -> Result<u32> {
    Ok(table.get(key).map_err(store_err)?.map(|v| v.value()).unwrap_or(0))
}

/// Take one slot of `cap`. Returns the new count, or `None` when the cap is
/// already reached (the counter is left untouched).
pub(crate) fn try_take(
    table: &mut Table<'_, &'static str, u32>,
    day: NaiveDate,
    channel: Channel,
    cap: u32,
) -> Result<Option<u32>> {
    let key = counter_key(day, channel);
    let used = read(&*table, &key)?;
    if used >= cap {
        return Ok(None);
    }
    table.insert(key.as_str(), used + 1).map_err(store_err)?;
    Ok(Some(used + 1))
}

/// Give back a slot taken by an attempt that was cancelled before dispatch.
pub(crate) fn release(
    table: &mut Table<'_, &'static str, u32>,
    day: NaiveDate,
    channel: Channel,
) -> Result<()> {
    let key = counter_key(day, channel);
    let used = read(&*table, &key)?;
    if used > 0 {
        table.insert(key.as_str(), used - 1).map_err(store_err)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
