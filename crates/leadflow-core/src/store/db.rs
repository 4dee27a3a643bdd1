//! redb-backed implementation of the lead store.
//!
//! # Table design
//!
//! ```text
//! meta             &str  -> u64          id sequence
//! leads            u64   -> JSON Lead
//! contacts         &str  -> u64          "email:<addr>" / "phone:<e164>" unique index
//! events           [lead_id be | occurred_ms be | uuid]  -> JSON EngagementEvent
//! provider_events  &str  -> uuid bytes   de-duplication of provider callbacks
//! attempts         [lead_id be | uuid]   -> JSON OutreachAttempt
//! opt_outs         "<lead_id>:<channel|*>" -> JSON OptOut
//! counters         "<YYYY-MM-DD>:<channel>" -> u32
//! ```
//!
//! Events and attempts lead with the big-endian lead id, so all rows of one
//! lead form a contiguous key range; events within it are ordered by
//! occurrence time regardless of arrival order.

use std::path::Path;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use redb::{Database, DatabaseError, ReadableTable, Table, TableDefinition, WriteTransaction};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::attempt::{AttemptStatus, OptOut, OutreachAttempt};
use crate::counter::{self, DailyUsage, COUNTERS};
use crate::error::{store_err, LeadflowError, Result};
use crate::event::{EngagementEvent, NewEvent, RecordOutcome};
use crate::lead::{self, Lead, NewLead};
use crate::score;
use crate::types::{Channel, LeadStage, Tier};

use super::{OptOutResult, Reservation, ReserveRequest};

// ---------------------------------------------------------------------------
// Table definitions
// ---------------------------------------------------------------------------

const META: TableDefinition<&str, u64> = TableDefinition::new("meta");
const LEADS: TableDefinition<u64, &[u8]> = TableDefinition::new("leads");
const CONTACTS: TableDefinition<&str, u64> = TableDefinition::new("contacts");
const EVENTS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("events");
const PROVIDER_EVENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("provider_events");
const ATTEMPTS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("attempts");
const OPT_OUTS: TableDefinition<&str, &[u8]> = TableDefinition::new("opt_outs");

const LEAD_SEQ: &str = "lead_seq";

// ---------------------------------------------------------------------------
// Key helpers
// ---------------------------------------------------------------------------

fn event_key(lead_id: u64, occurred_at: DateTime<Utc>, id: Uuid) -> [u8; 32] {
    let mut key = [0u8; 32];
    let ms = occurred_at.timestamp_millis().max(0) as u64;
    key[..8].copy_from_slice(&lead_id.to_be_bytes());
    key[8..16].copy_from_slice(&ms.to_be_bytes());
    key[16..].copy_from_slice(id.as_bytes());
    key
}

fn attempt_key(lead_id: u64, id: Uuid) -> [u8; 24] {
    let mut key = [0u8; 24];
    key[..8].copy_from_slice(&lead_id.to_be_bytes());
    key[8..].copy_from_slice(id.as_bytes());
    key
}

/// Inclusive key bounds covering every row of `lead_id` in a table whose
/// keys are `N` bytes long and start with the big-endian lead id.
fn lead_bounds<const N: usize>(lead_id: u64) -> ([u8; N], [u8; N]) {
    let mut lower = [0u8; N];
    let mut upper = [0xffu8; N];
    lower[..8].copy_from_slice(&lead_id.to_be_bytes());
    upper[..8].copy_from_slice(&lead_id.to_be_bytes());
    (lower, upper)
}

fn opt_out_key(lead_id: u64, channel: Option<Channel>) -> String {
    match channel {
        Some(c) => format!("{lead_id}:{c}"),
        None => format!("{lead_id}:*"),
    }
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(bytes)?)
}

// ---------------------------------------------------------------------------
// Row helpers shared by read and write transactions
// ---------------------------------------------------------------------------

fn load_lead(table: &impl ReadableTable<u64, &'static [u8]>, id: u64) -> Result<Lead> {
    let guard = table
        .get(id)
        .map_err(store_err)?
        .ok_or(LeadflowError::LeadNotFound(id))?;
    decode(guard.value())
}

fn put_lead(table: &mut Table<'_, u64, &'static [u8]>, lead: &Lead) -> Result<()> {
    let value = serde_json::to_vec(lead)?;
    table.insert(lead.id, value.as_slice()).map_err(store_err)?;
    Ok(())
}

fn lead_events(
    table: &impl ReadableTable<&'static [u8], &'static [u8]>,
    lead_id: u64,
) -> Result<Vec<EngagementEvent>> {
    let (lower, upper) = lead_bounds::<32>(lead_id);
    let mut result = Vec::new();
    for entry in table
        .range(lower.as_slice()..=upper.as_slice())
        .map_err(store_err)?
    {
        let (_, v) = entry.map_err(store_err)?;
        result.push(decode(v.value())?);
    }
    Ok(result)
}

fn lead_attempts(
    table: &impl ReadableTable<&'static [u8], &'static [u8]>,
    lead_id: u64,
) -> Result<Vec<OutreachAttempt>> {
    let (lower, upper) = lead_bounds::<24>(lead_id);
    let mut result: Vec<OutreachAttempt> = Vec::new();
    for entry in table
        .range(lower.as_slice()..=upper.as_slice())
        .map_err(store_err)?
    {
        let (_, v) = entry.map_err(store_err)?;
        result.push(decode(v.value())?);
    }
    result.sort_by_key(|a| a.sent_at);
    Ok(result)
}

fn put_attempt(
    table: &mut Table<'_, &'static [u8], &'static [u8]>,
    attempt: &OutreachAttempt,
) -> Result<()> {
    let key = attempt_key(attempt.lead_id, attempt.id);
    let value = serde_json::to_vec(attempt)?;
    table
        .insert(key.as_slice(), value.as_slice())
        .map_err(store_err)?;
    Ok(())
}

fn find_opt_out(
    table: &impl ReadableTable<&'static str, &'static [u8]>,
    lead_id: u64,
    channel: Channel,
) -> Result<Option<OptOut>> {
    for key in [opt_out_key(lead_id, None), opt_out_key(lead_id, Some(channel))] {
        if let Some(guard) = table.get(key.as_str()).map_err(store_err)? {
            return Ok(Some(decode(guard.value())?));
        }
    }
    Ok(None)
}

// ---------------------------------------------------------------------------
// LeadStore
// ---------------------------------------------------------------------------

/// Persistent store for leads and everything hanging off them.
#[derive(Debug)]
pub struct LeadStore {
    db: Database,
}

impl LeadStore {
    /// Open or create the redb database at `path`.
    ///
    /// Creates every table up front so read transactions never see a missing
    /// table. redb locks the file exclusively; while another handle holds it
    /// this fails with [`LeadflowError::StoreLocked`] instead of waiting.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(|e| match e {
            DatabaseError::DatabaseAlreadyOpen => {
                LeadflowError::StoreLocked(path.display().to_string())
            }
            other => store_err(other),
        })?;
        let wt = db.begin_write().map_err(store_err)?;
        wt.open_table(META).map_err(store_err)?;
        wt.open_table(LEADS).map_err(store_err)?;
        wt.open_table(CONTACTS).map_err(store_err)?;
        wt.open_table(EVENTS).map_err(store_err)?;
        wt.open_table(PROVIDER_EVENTS).map_err(store_err)?;
        wt.open_table(ATTEMPTS).map_err(store_err)?;
        wt.open_table(OPT_OUTS).map_err(store_err)?;
        wt.open_table(COUNTERS).map_err(store_err)?;
        wt.commit().map_err(store_err)?;
        Ok(Self { db })
    }

    fn begin_write(&self) -> Result<WriteTransaction> {
        self.db.begin_write().map_err(store_err)
    }

    // -----------------------------------------------------------------------
    // Leads
    // -----------------------------------------------------------------------

    /// Validate and insert a new lead. Rejected leads leave no trace.
    pub fn insert_lead(&self, new: NewLead, now: DateTime<Utc>) -> Result<Lead> {
        let new = new.normalized()?;
        let wt = self.begin_write()?;
        let lead = Self::insert_lead_in(&wt, new, now)?;
        wt.commit().map_err(store_err)?;
        debug!(lead_id = lead.id, business = %lead.business_name, "lead inserted");
        Ok(lead)
    }

    fn insert_lead_in(wt: &WriteTransaction, new: NewLead, now: DateTime<Utc>) -> Result<Lead> {
        let keys = lead::contact_keys(new.email.as_deref(), new.phone.as_deref());
        let mut contacts = wt.open_table(CONTACTS).map_err(store_err)?;
        for key in &keys {
            if contacts.get(key.as_str()).map_err(store_err)?.is_some() {
                return Err(LeadflowError::DuplicateLead(key.clone()));
            }
        }

        let mut meta = wt.open_table(META).map_err(store_err)?;
        let id = meta
            .get(LEAD_SEQ)
            .map_err(store_err)?
            .map(|v| v.value())
            .unwrap_or(0)
            + 1;
        meta.insert(LEAD_SEQ, id).map_err(store_err)?;

        let lead = Lead::from_new(id, new, now);
        let mut leads = wt.open_table(LEADS).map_err(store_err)?;
        put_lead(&mut leads, &lead)?;
        for key in &keys {
            contacts.insert(key.as_str(), id).map_err(store_err)?;
        }
        Ok(lead)
    }

    pub fn get_lead(&self, id: u64) -> Result<Lead> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(LEADS).map_err(store_err)?;
        load_lead(&table, id)
    }

    /// All leads in id order.
    pub fn list_leads(&self) -> Result<Vec<Lead>> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(LEADS).map_err(store_err)?;
        let mut result = Vec::new();
        for entry in table.iter().map_err(store_err)? {
            let (_, v) = entry.map_err(store_err)?;
            result.push(decode(v.value())?);
        }
        Ok(result)
    }

    /// Highest-scoring open leads, most recently active first on ties.
    pub fn hot_leads(&self, limit: usize) -> Result<Vec<Lead>> {
        let mut leads: Vec<Lead> = self
            .list_leads()?
            .into_iter()
            .filter(|l| !l.stage.is_terminal())
            .collect();
        leads.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| b.updated_at.cmp(&a.updated_at))
        });
        leads.truncate(limit);
        Ok(leads)
    }

    /// Close a lead as `customer` or `lost`.
    pub fn set_stage(&self, id: u64, stage: LeadStage, now: DateTime<Utc>) -> Result<Lead> {
        let wt = self.begin_write()?;
        let lead = {
            let mut leads = wt.open_table(LEADS).map_err(store_err)?;
            let mut lead = load_lead(&leads, id)?;
            if lead.stage.is_terminal() || !stage.is_terminal() {
                return Err(LeadflowError::InvalidTransition {
                    from: lead.stage.to_string(),
                    to: stage.to_string(),
                    reason: if lead.stage.is_terminal() {
                        "lead is already closed".to_string()
                    } else {
                        "only customer or lost can be set; other stages follow engagement"
                            .to_string()
                    },
                });
            }
            lead.stage = stage;
            lead.updated_at = now;
            put_lead(&mut leads, &lead)?;
            lead
        };
        wt.commit().map_err(store_err)?;
        info!(lead_id = id, stage = %stage, "lead closed");
        Ok(lead)
    }

    // -----------------------------------------------------------------------
    // Engagement events
    // -----------------------------------------------------------------------

    /// Append an engagement callback and refresh the lead's score and stage.
    ///
    /// A callback whose provider event id was already recorded changes
    /// nothing and yields [`RecordOutcome::Duplicate`].
    pub fn record_event(&self, new: NewEvent, now: DateTime<Utc>) -> Result<RecordOutcome> {
        let event = new.into_event(now);
        let wt = self.begin_write()?;
        let outcome = Self::record_event_in(&wt, event, now)?;
        wt.commit().map_err(store_err)?;
        match &outcome {
            RecordOutcome::Recorded { event, score } => {
                debug!(lead_id = event.lead_id, kind = %event.kind, score, "engagement recorded")
            }
            RecordOutcome::Duplicate { provider_event_id } => {
                debug!(provider_event_id = %provider_event_id, "duplicate engagement callback ignored")
            }
        }
        Ok(outcome)
    }

    fn record_event_in(
        wt: &WriteTransaction,
        event: EngagementEvent,
        now: DateTime<Utc>,
    ) -> Result<RecordOutcome> {
        let mut leads = wt.open_table(LEADS).map_err(store_err)?;
        let mut lead = load_lead(&leads, event.lead_id)?;

        let mut providers = wt.open_table(PROVIDER_EVENTS).map_err(store_err)?;
        if let Some(pid) = &event.provider_event_id {
            if providers.get(pid.as_str()).map_err(store_err)?.is_some() {
                return Ok(RecordOutcome::Duplicate {
                    provider_event_id: pid.clone(),
                });
            }
            providers
                .insert(pid.as_str(), event.id.as_bytes().as_slice())
                .map_err(store_err)?;
        }

        let mut events = wt.open_table(EVENTS).map_err(store_err)?;
        let key = event_key(event.lead_id, event.occurred_at, event.id);
        let value = serde_json::to_vec(&event)?;
        events
            .insert(key.as_slice(), value.as_slice())
            .map_err(store_err)?;

        let history = lead_events(&events, lead.id)?;
        let scored = score::compute(lead.id, &history);
        lead.score = scored.score;
        lead.updated_at = now;
        lead.promote(LeadStage::Engaged, now);
        if scored.tier == Tier::Hot {
            lead.promote(LeadStage::Hot, now);
        }
        put_lead(&mut leads, &lead)?;

        Ok(RecordOutcome::Recorded {
            event,
            score: scored.score,
        })
    }

    /// A lead's events ordered by when they happened.
    pub fn events_for(&self, lead_id: u64) -> Result<Vec<EngagementEvent>> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(EVENTS).map_err(store_err)?;
        lead_events(&table, lead_id)
    }

    // -----------------------------------------------------------------------
    // Opt-outs
    // -----------------------------------------------------------------------

    /// Stop all further outreach to a lead, on one channel or all of them.
    ///
    /// Pending attempts the opt-out covers are cancelled in the same
    /// transaction. Their counter slots stay taken: a pending attempt may
    /// already be in the dispatcher's hands.
    pub fn opt_out(
        &self,
        lead_id: u64,
        channel: Option<Channel>,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<OptOutResult> {
        let wt = self.begin_write()?;
        let result = Self::opt_out_in(&wt, lead_id, channel, reason, now)?;
        wt.commit().map_err(store_err)?;
        info!(
            lead_id,
            channel = channel.map(Channel::as_str).unwrap_or("all"),
            cancelled = result.cancelled.len(),
            "lead opted out"
        );
        Ok(result)
    }

    fn opt_out_in(
        wt: &WriteTransaction,
        lead_id: u64,
        channel: Option<Channel>,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<OptOutResult> {
        let leads = wt.open_table(LEADS).map_err(store_err)?;
        load_lead(&leads, lead_id)?;

        let opt_out = OptOut {
            lead_id,
            channel,
            reason: reason.to_string(),
            at: now,
        };
        let mut opt_outs = wt.open_table(OPT_OUTS).map_err(store_err)?;
        let value = serde_json::to_vec(&opt_out)?;
        opt_outs
            .insert(opt_out_key(lead_id, channel).as_str(), value.as_slice())
            .map_err(store_err)?;

        let mut attempts = wt.open_table(ATTEMPTS).map_err(store_err)?;
        let mut cancelled = Vec::new();
        for mut attempt in lead_attempts(&attempts, lead_id)? {
            if attempt.status.is_pending() && opt_out.covers(attempt.channel) {
                attempt.status = AttemptStatus::Cancelled {
                    reason: format!("opted out: {reason}"),
                    slot_released: false,
                };
                attempt.updated_at = now;
                put_attempt(&mut attempts, &attempt)?;
                cancelled.push(attempt);
            }
        }
        Ok(OptOutResult { opt_out, cancelled })
    }

    /// The opt-out stopping `lead_id` on `channel`, if any.
    pub fn stopped(&self, lead_id: u64, channel: Channel) -> Result<Option<OptOut>> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(OPT_OUTS).map_err(store_err)?;
        find_opt_out(&table, lead_id, channel)
    }

    pub fn list_opt_outs(&self) -> Result<Vec<OptOut>> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(OPT_OUTS).map_err(store_err)?;
        let mut result = Vec::new();
        for entry in table.iter().map_err(store_err)? {
            let (_, v) = entry.map_err(store_err)?;
            result.push(decode(v.value())?);
        }
        Ok(result)
    }

    // -----------------------------------------------------------------------
    // Attempts
    // -----------------------------------------------------------------------

    /// Atomically claim a dispatch slot for one sequence step.
    ///
    /// In a single write transaction: the lead must be open, not opted out
    /// of the channel, have no pending attempt on the channel and not have
    /// attempted this step yet; then the day's channel counter is checked and
    /// incremented and a `Pending` attempt is recorded. Any failed check
    /// leaves the store untouched.
    pub fn reserve(&self, req: &ReserveRequest) -> Result<Reservation> {
        let wt = self.begin_write()?;
        let reservation = Self::reserve_in(&wt, req)?;
        wt.commit().map_err(store_err)?;
        Ok(reservation)
    }

    fn reserve_in(wt: &WriteTransaction, req: &ReserveRequest) -> Result<Reservation> {
        let leads = wt.open_table(LEADS).map_err(store_err)?;
        let lead = load_lead(&leads, req.lead_id)?;
        if lead.stage.is_terminal() {
            return Ok(Reservation::LeadClosed { stage: lead.stage });
        }

        let opt_outs = wt.open_table(OPT_OUTS).map_err(store_err)?;
        if let Some(opt_out) = find_opt_out(&opt_outs, req.lead_id, req.channel)? {
            return Ok(Reservation::Stopped(opt_out));
        }

        let mut attempts = wt.open_table(ATTEMPTS).map_err(store_err)?;
        for existing in lead_attempts(&attempts, req.lead_id)?
            .iter()
            .filter(|a| a.channel == req.channel)
        {
            if existing.status.is_pending() {
                return Ok(Reservation::AlreadyPending {
                    attempt_id: existing.id,
                });
            }
            if existing.status.consumes_step() && existing.step_index >= req.step_index {
                return Ok(Reservation::StepTaken);
            }
        }

        let mut counters = wt.open_table(COUNTERS).map_err(store_err)?;
        if counter::try_take(&mut counters, req.day, req.channel, req.cap)?.is_none() {
            let used = counter::read(&counters, &counter::counter_key(req.day, req.channel))?;
            return Ok(Reservation::CapReached { used, cap: req.cap });
        }

        let mut attempt =
            OutreachAttempt::new_pending(req.lead_id, req.channel, req.step_index, req.day, req.now);
        attempt.subject = req.subject.clone();
        attempt.content = Some(req.content.clone());
        put_attempt(&mut attempts, &attempt)?;
        Ok(Reservation::Reserved(attempt))
    }

    /// Write back the dispatcher's answer for a pending attempt.
    ///
    /// An attempt an opt-out cancelled mid-dispatch still takes the real
    /// outcome, with `note` saying so. A `Sent` result moves a `new` lead to
    /// `contacted`.
    pub fn complete_attempt(
        &self,
        lead_id: u64,
        attempt_id: Uuid,
        status: AttemptStatus,
        now: DateTime<Utc>,
    ) -> Result<OutreachAttempt> {
        let wt = self.begin_write()?;
        let attempt = Self::complete_attempt_in(&wt, lead_id, attempt_id, status, now)?;
        wt.commit().map_err(store_err)?;
        Ok(attempt)
    }

    fn complete_attempt_in(
        wt: &WriteTransaction,
        lead_id: u64,
        attempt_id: Uuid,
        status: AttemptStatus,
        now: DateTime<Utc>,
    ) -> Result<OutreachAttempt> {
        let mut attempts = wt.open_table(ATTEMPTS).map_err(store_err)?;
        let key = attempt_key(lead_id, attempt_id);
        let mut attempt: OutreachAttempt = match attempts.get(key.as_slice()).map_err(store_err)? {
            Some(guard) => decode(guard.value())?,
            None => return Err(LeadflowError::AttemptNotFound(attempt_id)),
        };
        match &attempt.status {
            AttemptStatus::Pending => {}
            AttemptStatus::Cancelled {
                reason,
                slot_released: false,
            } if status.consumes_step() => {
                attempt.note = Some(format!("{reason} during dispatch"));
            }
            other => {
                return Err(LeadflowError::InvalidTransition {
                    from: other.label().to_string(),
                    to: status.label().to_string(),
                    reason: "attempt is no longer pending".to_string(),
                });
            }
        }

        let sent = matches!(status, AttemptStatus::Sent { .. });
        attempt.status = status;
        attempt.updated_at = now;
        put_attempt(&mut attempts, &attempt)?;

        if sent {
            let mut leads = wt.open_table(LEADS).map_err(store_err)?;
            let mut lead = load_lead(&leads, lead_id)?;
            if lead.promote(LeadStage::Contacted, now) {
                put_lead(&mut leads, &lead)?;
            }
        }
        Ok(attempt)
    }

    /// Cancel a pending attempt that was never handed to a dispatcher and
    /// return its counter slot. Attempts that are no longer pending are
    /// returned unchanged.
    pub fn cancel_attempt(
        &self,
        lead_id: u64,
        attempt_id: Uuid,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<OutreachAttempt> {
        let wt = self.begin_write()?;
        let attempt = {
            let mut attempts = wt.open_table(ATTEMPTS).map_err(store_err)?;
            let key = attempt_key(lead_id, attempt_id);
            let mut attempt: OutreachAttempt =
                match attempts.get(key.as_slice()).map_err(store_err)? {
                    Some(guard) => decode(guard.value())?,
                    None => return Err(LeadflowError::AttemptNotFound(attempt_id)),
                };
            if attempt.status.is_pending() {
                attempt.status = AttemptStatus::Cancelled {
                    reason: reason.to_string(),
                    slot_released: true,
                };
                attempt.updated_at = now;
                let mut counters = wt.open_table(COUNTERS).map_err(store_err)?;
                counter::release(&mut counters, attempt.counted_day, attempt.channel)?;
                put_attempt(&mut attempts, &attempt)?;
            }
            attempt
        };
        wt.commit().map_err(store_err)?;
        Ok(attempt)
    }

    /// Mark pending attempts not updated within `max_age` as failed.
    ///
    /// These are left behind by a run that died between reserving and
    /// writing back the dispatcher's answer. Their slots stay counted, since
    /// the dispatcher may have sent them.
    pub fn recover_stale(&self, max_age: Duration, now: DateTime<Utc>) -> Result<Vec<OutreachAttempt>> {
        let cutoff = now - max_age;
        let wt = self.begin_write()?;
        let recovered = {
            let mut attempts = wt.open_table(ATTEMPTS).map_err(store_err)?;
            let mut stale: Vec<OutreachAttempt> = Vec::new();
            for entry in attempts.iter().map_err(store_err)? {
                let (_, v) = entry.map_err(store_err)?;
                let attempt: OutreachAttempt = decode(v.value())?;
                if attempt.status.is_pending() && attempt.updated_at < cutoff {
                    stale.push(attempt);
                }
            }
            for attempt in &mut stale {
                attempt.status = AttemptStatus::Failed {
                    reason: "recovered from interrupted run".to_string(),
                };
                attempt.updated_at = now;
                put_attempt(&mut attempts, attempt)?;
                warn!(
                    lead_id = attempt.lead_id,
                    channel = %attempt.channel,
                    step = attempt.step_index,
                    "recovered stale pending attempt"
                );
            }
            stale
        };
        wt.commit().map_err(store_err)?;
        Ok(recovered)
    }

    pub fn attempts_for(&self, lead_id: u64) -> Result<Vec<OutreachAttempt>> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(ATTEMPTS).map_err(store_err)?;
        lead_attempts(&table, lead_id)
    }

    /// All attempts, newest first.
    pub fn list_attempts(&self) -> Result<Vec<OutreachAttempt>> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(ATTEMPTS).map_err(store_err)?;
        let mut result: Vec<OutreachAttempt> = Vec::new();
        for entry in table.iter().map_err(store_err)? {
            let (_, v) = entry.map_err(store_err)?;
            result.push(decode(v.value())?);
        }
        result.sort_by(|a, b| b.sent_at.cmp(&a.sent_at));
        Ok(result)
    }

    // -----------------------------------------------------------------------
    // Counters
    // -----------------------------------------------------------------------

    pub fn counter(&self, day: NaiveDate, channel: Channel) -> Result<u32> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(COUNTERS).map_err(store_err)?;
        counter::read(&table, &counter::counter_key(day, channel))
    }

    pub fn usage(&self, day: NaiveDate, channel: Channel, cap: u32) -> Result<DailyUsage> {
        Ok(DailyUsage {
            day,
            channel,
            used: self.counter(day, channel)?,
            cap,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
