//! Sequence scheduler.
//!
//! A tick walks every open lead, works out which sequence step is due on
//! each channel, and dispatches as many as the day's caps allow, hottest
//! leads first. Each step is claimed through [`LeadStore::reserve`], which
//! checks opt-out, pending attempts and the daily counter in one redb write
//! transaction, so overlapping ticks (threads or processes) can neither
//! double-send a step nor overshoot a cap.
//!
//! Steps that miss the cap are not persisted anywhere: they are still due
//! on the next day and, having waited longest, sort ahead of newer steps of
//! the same tier.

use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::attempt::{AttemptStatus, OptOut, OutreachAttempt};
use crate::config::{ChannelsConfig, Config};
use crate::counter::{Caps, DayClock};
use crate::dispatch::{DispatchRequest, DispatchStatus, Dispatcher};
use crate::error::{LeadflowError, Result};
use crate::lead::Lead;
use crate::sequence::{self, RenderContext, SequenceCatalog};
use crate::store::{LeadStore, Reservation, ReserveRequest};
use crate::types::{Channel, Tier};

// ---------------------------------------------------------------------------
// SchedulePolicy
// ---------------------------------------------------------------------------

/// The knobs a tick runs under, resolved from [`Config`].
#[derive(Debug, Clone)]
pub struct SchedulePolicy {
    pub caps: Caps,
    pub clock: DayClock,
    pub channels: ChannelsConfig,
    /// Pending attempts untouched for longer than this are marked failed.
    pub recovery: Duration,
    pub render: RenderContext,
}

impl SchedulePolicy {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            caps: config.caps,
            clock: config.day_clock()?,
            channels: config.channels.clone(),
            recovery: Duration::minutes(i64::from(config.recovery_minutes)),
            render: config.render_context(),
        })
    }

    fn min_tier(&self, channel: Channel) -> Tier {
        self.channels.for_channel(channel).min_tier
    }
}

impl Default for SchedulePolicy {
    fn default() -> Self {
        Self {
            caps: Caps::default(),
            clock: DayClock::Local,
            channels: ChannelsConfig::default(),
            recovery: Duration::minutes(60),
            render: RenderContext::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Per-(lead, channel) state
// ---------------------------------------------------------------------------

/// Where a lead stands in one channel's sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ChannelState {
    NotStarted,
    /// Reserved and handed to a dispatcher, no answer yet.
    Pending { step: u32 },
    /// The last attempted step; more steps follow.
    Sent { step: u32, at: DateTime<Utc> },
    /// Every step was attempted.
    Completed,
    Stopped,
}

/// A sequence step that is due now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DueStep {
    pub lead_id: u64,
    pub business_name: String,
    pub channel: Channel,
    pub step_index: u32,
    pub tier: Tier,
    pub due_at: DateTime<Utc>,
    pub to: String,
}

// ---------------------------------------------------------------------------
// TickReport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickEntry {
    pub lead_id: u64,
    pub channel: Channel,
    pub step_index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl TickEntry {
    fn for_attempt(attempt: &OutreachAttempt, detail: Option<String>) -> Self {
        Self {
            lead_id: attempt.lead_id,
            channel: attempt.channel,
            step_index: attempt.step_index,
            attempt_id: Some(attempt.id),
            detail,
        }
    }

    fn for_step(step: &DueStep, detail: impl Into<String>) -> Self {
        Self {
            lead_id: step.lead_id,
            channel: step.channel,
            step_index: step.step_index,
            attempt_id: None,
            detail: Some(detail.into()),
        }
    }
}

/// A due step held back by the daily cap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Deferral {
    pub lead_id: u64,
    pub channel: Channel,
    pub step_index: u32,
    /// Start of the next counter day.
    pub until: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub day: NaiveDate,
    pub recovered: Vec<TickEntry>,
    pub sent: Vec<TickEntry>,
    pub failed: Vec<TickEntry>,
    pub deferred: Vec<Deferral>,
    pub cancelled: Vec<TickEntry>,
    /// Candidates another tick claimed first, or that closed meanwhile.
    pub skipped: Vec<TickEntry>,
}

impl TickReport {
    fn new(day: NaiveDate) -> Self {
        Self {
            day,
            recovered: Vec::new(),
            sent: Vec::new(),
            failed: Vec::new(),
            deferred: Vec::new(),
            cancelled: Vec::new(),
            skipped: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.recovered.is_empty()
            && self.sent.is_empty()
            && self.failed.is_empty()
            && self.deferred.is_empty()
            && self.cancelled.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

pub struct Scheduler<'a> {
    store: &'a LeadStore,
    catalog: &'a SequenceCatalog,
    policy: SchedulePolicy,
}

impl<'a> Scheduler<'a> {
    pub fn new(store: &'a LeadStore, catalog: &'a SequenceCatalog, policy: SchedulePolicy) -> Self {
        Self {
            store,
            catalog,
            policy,
        }
    }

    /// State of `lead`'s sequence on `channel`.
    pub fn channel_state(&self, lead: &Lead, channel: Channel) -> Result<ChannelState> {
        let stopped = self.store.stopped(lead.id, channel)?.is_some();
        let attempts = self.store.attempts_for(lead.id)?;
        Ok(self.state_from(lead, channel, stopped, &attempts))
    }

    fn state_from(
        &self,
        lead: &Lead,
        channel: Channel,
        stopped: bool,
        attempts: &[OutreachAttempt],
    ) -> ChannelState {
        if stopped {
            return ChannelState::Stopped;
        }
        let on_channel = attempts.iter().filter(|a| a.channel == channel);
        let mut last: Option<&OutreachAttempt> = None;
        for attempt in on_channel {
            if attempt.status.is_pending() {
                return ChannelState::Pending {
                    step: attempt.step_index,
                };
            }
            let later = last.map_or(true, |l| l.step_index < attempt.step_index);
            if attempt.status.consumes_step() && later {
                last = Some(attempt);
            }
        }
        match last {
            None if self.catalog.steps(&lead.vertical, channel).is_empty() => {
                ChannelState::Completed
            }
            None => ChannelState::NotStarted,
            Some(a) => {
                if self
                    .catalog
                    .next_step(&lead.vertical, channel, Some(a.step_index))
                    .is_some()
                {
                    ChannelState::Sent {
                        step: a.step_index,
                        at: a.sent_at,
                    }
                } else {
                    ChannelState::Completed
                }
            }
        }
    }

    /// The step due for `lead` on `channel` at `now`, if any.
    fn due_step(
        &self,
        lead: &Lead,
        channel: Channel,
        stopped: bool,
        attempts: &[OutreachAttempt],
        now: DateTime<Utc>,
    ) -> Option<DueStep> {
        if lead.stage.is_terminal() || lead.tier() < self.policy.min_tier(channel) {
            return None;
        }
        let to = lead.contact_for(channel)?;
        let (after, since) = match self.state_from(lead, channel, stopped, attempts) {
            ChannelState::NotStarted => (None, lead.created_at),
            ChannelState::Sent { step, at } => (Some(step), at),
            ChannelState::Pending { .. } | ChannelState::Completed | ChannelState::Stopped => {
                return None
            }
        };
        let step = self.catalog.next_step(&lead.vertical, channel, after)?;
        // The delay counts from the previous attempt; an opening step is due at once.
        let due_at = match after {
            None => since,
            Some(_) => since + step.delay(),
        };
        (due_at <= now).then(|| DueStep {
            lead_id: lead.id,
            business_name: lead.business_name.clone(),
            channel,
            step_index: step.step_index,
            tier: lead.tier(),
            due_at,
            to: to.to_string(),
        })
    }

    /// Every step due at `now`, in dispatch order: by channel, then tier
    /// (hottest first), then longest waiting, then lead id. Reserves nothing.
    pub fn plan(&self, now: DateTime<Utc>) -> Result<Vec<DueStep>> {
        let leads = self.store.list_leads()?;
        let mut attempts: HashMap<u64, Vec<OutreachAttempt>> = HashMap::new();
        for attempt in self.store.list_attempts()? {
            attempts.entry(attempt.lead_id).or_default().push(attempt);
        }
        let mut opt_outs: HashMap<u64, Vec<OptOut>> = HashMap::new();
        for opt_out in self.store.list_opt_outs()? {
            opt_outs.entry(opt_out.lead_id).or_default().push(opt_out);
        }

        let mut due = Vec::new();
        for lead in leads.iter().filter(|l| !l.stage.is_terminal()) {
            let lead_attempts = attempts.get(&lead.id).map(Vec::as_slice).unwrap_or(&[]);
            let lead_opt_outs = opt_outs.get(&lead.id).map(Vec::as_slice).unwrap_or(&[]);
            for &channel in Channel::all() {
                let stopped = lead_opt_outs.iter().any(|o| o.covers(channel));
                if let Some(step) = self.due_step(lead, channel, stopped, lead_attempts, now) {
                    due.push(step);
                }
            }
        }

        due.sort_by(|a, b| {
            a.channel
                .cmp(&b.channel)
                .then_with(|| b.tier.cmp(&a.tier))
                .then_with(|| a.due_at.cmp(&b.due_at))
                .then_with(|| a.lead_id.cmp(&b.lead_id))
        });
        Ok(due)
    }

    /// Run one scheduling pass at `now`.
    ///
    /// Safe to repeat and to run concurrently with other ticks: a step that
    /// was sent or failed is never attempted again.
    pub fn tick(&self, now: DateTime<Utc>, dispatcher: &dyn Dispatcher) -> Result<TickReport> {
        let day = self.policy.clock.day_of(now);
        let mut report = TickReport::new(day);

        for attempt in self.store.recover_stale(self.policy.recovery, now)? {
            report
                .recovered
                .push(TickEntry::for_attempt(&attempt, Some("interrupted run".to_string())));
        }

        let due = self.plan(now)?;
        for &channel in Channel::all() {
            let cap = self.policy.caps.for_channel(channel);
            let mut cap_reached = false;
            for step in due.iter().filter(|s| s.channel == channel) {
                if cap_reached {
                    report.deferred.push(self.deferral(step, now));
                    continue;
                }
                let lead = self.store.get_lead(step.lead_id)?;
                let Some(req) = self.reserve_request(&lead, step, day, cap, now) else {
                    continue;
                };
                match self.store.reserve(&req)? {
                    Reservation::Reserved(attempt) => {
                        self.dispatch_reserved(&attempt, step, dispatcher, now, &mut report)?;
                    }
                    Reservation::CapReached { used, cap } => {
                        cap_reached = true;
                        let until = self.policy.clock.next_day_start(now);
                        info!(
                            channel = %channel,
                            used,
                            cap,
                            until = %until,
                            "daily cap reached; deferring remaining {channel} steps"
                        );
                        report.deferred.push(self.deferral(step, now));
                    }
                    Reservation::Stopped(opt_out) => report
                        .skipped
                        .push(TickEntry::for_step(step, format!("opted out: {}", opt_out.reason))),
                    Reservation::AlreadyPending { .. } => report
                        .skipped
                        .push(TickEntry::for_step(step, "attempt already pending")),
                    Reservation::StepTaken => report
                        .skipped
                        .push(TickEntry::for_step(step, "step already attempted")),
                    Reservation::LeadClosed { stage } => report
                        .skipped
                        .push(TickEntry::for_step(step, format!("lead is {stage}"))),
                }
            }
        }

        info!(
            day = %day,
            sent = report.sent.len(),
            failed = report.failed.len(),
            deferred = report.deferred.len(),
            cancelled = report.cancelled.len(),
            recovered = report.recovered.len(),
            "tick complete"
        );
        Ok(report)
    }

    fn deferral(&self, step: &DueStep, now: DateTime<Utc>) -> Deferral {
        Deferral {
            lead_id: step.lead_id,
            channel: step.channel,
            step_index: step.step_index,
            until: self.policy.clock.next_day_start(now),
        }
    }

    fn reserve_request(
        &self,
        lead: &Lead,
        step: &DueStep,
        day: NaiveDate,
        cap: u32,
        now: DateTime<Utc>,
    ) -> Option<ReserveRequest> {
        let Some(def) = self.catalog.step(&lead.vertical, step.channel, step.step_index) else {
            warn!(
                lead_id = lead.id,
                channel = %step.channel,
                step = step.step_index,
                "sequence step disappeared from catalog"
            );
            return None;
        };
        Some(ReserveRequest {
            lead_id: lead.id,
            channel: step.channel,
            step_index: step.step_index,
            day,
            cap,
            subject: def
                .subject
                .as_deref()
                .map(|s| sequence::render(s, lead, &self.policy.render)),
            content: sequence::render(&def.template, lead, &self.policy.render),
            now,
        })
    }

    fn dispatch_reserved(
        &self,
        attempt: &OutreachAttempt,
        step: &DueStep,
        dispatcher: &dyn Dispatcher,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) -> Result<()> {
        if let Some(opt_out) = self.store.stopped(attempt.lead_id, attempt.channel)? {
            let cancelled = self.store.cancel_attempt(
                attempt.lead_id,
                attempt.id,
                &format!("opted out: {}", opt_out.reason),
                now,
            )?;
            report
                .cancelled
                .push(TickEntry::for_attempt(&cancelled, Some(opt_out.reason)));
            return Ok(());
        }

        let req = DispatchRequest {
            attempt_id: attempt.id,
            lead_id: attempt.lead_id,
            channel: attempt.channel,
            to: step.to.clone(),
            subject: attempt.subject.clone(),
            rendered_content: attempt.content.clone().unwrap_or_default(),
        };
        let status = match dispatcher.dispatch(&req) {
            Ok(outcome) => match outcome.status {
                DispatchStatus::Sent => AttemptStatus::Sent {
                    provider_ref: outcome.provider_ref,
                },
                DispatchStatus::Failed => AttemptStatus::Failed {
                    reason: outcome.error.unwrap_or_else(|| "dispatch failed".to_string()),
                },
            },
            Err(e) => {
                error!(lead_id = attempt.lead_id, channel = %attempt.channel, error = %e, "dispatcher error");
                AttemptStatus::Failed {
                    reason: e.to_string(),
                }
            }
        };

        match self
            .store
            .complete_attempt(attempt.lead_id, attempt.id, status, now)
        {
            Ok(done) => match &done.status {
                AttemptStatus::Sent { .. } => {
                    debug!(lead_id = done.lead_id, channel = %done.channel, step = done.step_index, "sent");
                    report.sent.push(TickEntry::for_attempt(&done, done.note.clone()));
                }
                AttemptStatus::Failed { reason } => {
                    warn!(lead_id = done.lead_id, channel = %done.channel, step = done.step_index, reason = %reason, "attempt failed");
                    report
                        .failed
                        .push(TickEntry::for_attempt(&done, Some(reason.clone())));
                }
                _ => {}
            },
            // Another tick recovered the attempt while the dispatcher held it.
            Err(LeadflowError::InvalidTransition { from, .. }) => {
                warn!(
                    lead_id = attempt.lead_id,
                    channel = %attempt.channel,
                    status = %from,
                    "attempt changed during dispatch; result discarded"
                );
                report.cancelled.push(TickEntry::for_attempt(
                    attempt,
                    Some(format!("{from} during dispatch")),
                ));
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{DispatchOutcome, DryRunDispatcher};
    use crate::event::NewEvent;
    use crate::lead::NewLead;
    use crate::sequence::SequenceStep;
    use crate::types::{EventKind, LeadStage};
    use chrono::{FixedOffset, TimeZone};
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn open_tmp() -> (TempDir, LeadStore) {
        let dir = TempDir::new().unwrap();
        let store = LeadStore::open(&dir.path().join("leads.redb")).unwrap();
        (dir, store)
    }

    fn utc_policy(caps: Caps) -> SchedulePolicy {
        SchedulePolicy {
            caps,
            clock: DayClock::Fixed(FixedOffset::east_opt(0).unwrap()),
            ..SchedulePolicy::default()
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap()
    }

    fn email_lead(store: &LeadStore, n: usize, at: DateTime<Utc>) -> Lead {
        store
            .insert_lead(
                NewLead {
                    business_name: format!("Biz {n}"),
                    email: Some(format!("owner{n}@biz{n}.com")),
                    ..Default::default()
                },
                at,
            )
            .unwrap()
    }

    fn email_only_catalog() -> SequenceCatalog {
        SequenceCatalog::new(
            [(1, 0), (2, 2), (3, 4)].map(|(idx, delay)| SequenceStep {
                vertical: "all".to_string(),
                channel: Channel::Email,
                step_index: idx,
                delay_days: delay,
                subject: Some("Hi {{business_name}}".to_string()),
                template: "Step {{first_name}}".to_string(),
            }),
        )
    }

    /// Records requests and answers with a fixed status.
    struct Recording {
        status: DispatchStatus,
        seen: Mutex<Vec<DispatchRequest>>,
    }

    impl Recording {
        fn new(status: DispatchStatus) -> Self {
            Self {
                status,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl Dispatcher for Recording {
        fn dispatch(&self, req: &DispatchRequest) -> Result<DispatchOutcome> {
            self.seen.lock().unwrap().push(req.clone());
            Ok(match self.status {
                DispatchStatus::Sent => DispatchOutcome::sent(Some("ref".to_string())),
                DispatchStatus::Failed => DispatchOutcome::failed("bounced"),
            })
        }
    }

    #[test]
    fn cap_defers_overflow_to_next_day() {
        let (_dir, store) = open_tmp();
        let catalog = email_only_catalog();
        for n in 0..101 {
            email_lead(&store, n, t0() - Duration::minutes(101 - n as i64));
        }
        let scheduler = Scheduler::new(&store, &catalog, utc_policy(Caps::default()));

        let report = scheduler.tick(t0(), &DryRunDispatcher).unwrap();
        assert_eq!(report.sent.len(), 100);
        assert_eq!(report.deferred.len(), 1);
        let deferred = &report.deferred[0];
        // Latest arrival waits.
        assert_eq!(deferred.lead_id, 101);
        assert_eq!(deferred.until, Utc.with_ymd_and_hms(2026, 10, 20, 0, 0, 0).unwrap());
        assert_eq!(
            store.counter(report.day, Channel::Email).unwrap(),
            100
        );

        let next = scheduler
            .tick(t0() + Duration::days(1), &DryRunDispatcher)
            .unwrap();
        assert_eq!(next.sent.len(), 1);
        assert_eq!(next.sent[0].lead_id, 101);
        assert!(next.deferred.is_empty());
    }

    #[test]
    fn repeated_ticks_do_not_resend() {
        let (_dir, store) = open_tmp();
        let catalog = email_only_catalog();
        email_lead(&store, 1, t0());
        let scheduler = Scheduler::new(&store, &catalog, utc_policy(Caps::default()));
        let dispatcher = Recording::new(DispatchStatus::Sent);

        assert_eq!(scheduler.tick(t0(), &dispatcher).unwrap().sent.len(), 1);
        let again = scheduler.tick(t0() + Duration::hours(1), &dispatcher).unwrap();
        assert!(again.is_empty(), "{again:?}");
        assert_eq!(dispatcher.seen.lock().unwrap().len(), 1);
        assert_eq!(store.get_lead(1).unwrap().stage, LeadStage::Contacted);
    }

    #[test]
    fn steps_follow_their_delays() {
        let (_dir, store) = open_tmp();
        let catalog = email_only_catalog();
        email_lead(&store, 1, t0());
        let scheduler = Scheduler::new(&store, &catalog, utc_policy(Caps::default()));

        scheduler.tick(t0(), &DryRunDispatcher).unwrap();
        let early = scheduler
            .tick(t0() + Duration::days(1), &DryRunDispatcher)
            .unwrap();
        assert!(early.sent.is_empty());
        let on_time = scheduler
            .tick(t0() + Duration::days(2), &DryRunDispatcher)
            .unwrap();
        assert_eq!(on_time.sent[0].step_index, 2);

        scheduler
            .tick(t0() + Duration::days(6), &DryRunDispatcher)
            .unwrap();
        let lead = store.get_lead(1).unwrap();
        assert_eq!(
            scheduler.channel_state(&lead, Channel::Email).unwrap(),
            ChannelState::Completed
        );
        assert!(scheduler
            .tick(t0() + Duration::days(30), &DryRunDispatcher)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn failed_attempt_advances_to_next_step() {
        let (_dir, store) = open_tmp();
        let catalog = email_only_catalog();
        email_lead(&store, 1, t0());
        let scheduler = Scheduler::new(&store, &catalog, utc_policy(Caps::default()));

        let failing = Recording::new(DispatchStatus::Failed);
        let report = scheduler.tick(t0(), &failing).unwrap();
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].detail.as_deref(), Some("bounced"));
        assert_eq!(store.get_lead(1).unwrap().stage, LeadStage::New);

        let report = scheduler
            .tick(t0() + Duration::days(2), &DryRunDispatcher)
            .unwrap();
        assert_eq!(report.sent.len(), 1);
        assert_eq!(report.sent[0].step_index, 2);
    }

    #[test]
    fn opted_out_lead_never_gets_an_attempt() {
        let (_dir, store) = open_tmp();
        let catalog = email_only_catalog();
        let lead = email_lead(&store, 1, t0());
        store.opt_out(lead.id, None, "unsubscribe", t0()).unwrap();
        let scheduler = Scheduler::new(&store, &catalog, utc_policy(Caps::default()));

        for days in [0, 3, 10] {
            let report = scheduler
                .tick(t0() + Duration::days(days), &DryRunDispatcher)
                .unwrap();
            assert!(report.sent.is_empty());
        }
        assert!(store.attempts_for(lead.id).unwrap().is_empty());
        assert_eq!(
            scheduler.channel_state(&lead, Channel::Email).unwrap(),
            ChannelState::Stopped
        );
    }

    #[test]
    fn hot_leads_win_the_last_slot() {
        let (_dir, store) = open_tmp();
        let catalog = email_only_catalog();
        let cold = email_lead(&store, 1, t0() - Duration::hours(5));
        let hot = email_lead(&store, 2, t0());
        for (i, kind) in [EventKind::Reply, EventKind::SiteVisit, EventKind::LinkClick]
            .into_iter()
            .enumerate()
        {
            store
                .record_event(
                    NewEvent {
                        lead_id: hot.id,
                        kind,
                        occurred_at: None,
                        provider_event_id: Some(format!("evt-{i}")),
                    },
                    t0(),
                )
                .unwrap();
        }
        let caps = Caps {
            email: 1,
            ..Caps::default()
        };
        let scheduler = Scheduler::new(&store, &catalog, utc_policy(caps));

        let plan = scheduler.plan(t0()).unwrap();
        assert_eq!(plan[0].lead_id, hot.id);
        assert_eq!(plan[0].tier, Tier::Hot);

        let report = scheduler.tick(t0(), &DryRunDispatcher).unwrap();
        assert_eq!(report.sent.len(), 1);
        assert_eq!(report.sent[0].lead_id, hot.id);
        assert_eq!(report.deferred[0].lead_id, cold.id);
    }

    #[test]
    fn min_tier_gates_channel() {
        let (_dir, store) = open_tmp();
        let catalog = SequenceCatalog::builtin();
        store
            .insert_lead(
                NewLead {
                    business_name: "Cold Call Co".to_string(),
                    phone: Some("6025550000".to_string()),
                    ..Default::default()
                },
                t0(),
            )
            .unwrap();
        let mut policy = utc_policy(Caps::default());
        policy.channels.call.min_tier = Tier::Warm;
        let scheduler = Scheduler::new(&store, &catalog, policy);

        let plan = scheduler.plan(t0()).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].channel, Channel::Sms);
    }

    #[test]
    fn closed_leads_are_not_planned() {
        let (_dir, store) = open_tmp();
        let catalog = email_only_catalog();
        let lead = email_lead(&store, 1, t0());
        store.set_stage(lead.id, LeadStage::Customer, t0()).unwrap();
        let scheduler = Scheduler::new(&store, &catalog, utc_policy(Caps::default()));
        assert!(scheduler.plan(t0()).unwrap().is_empty());
    }

    #[test]
    fn content_is_rendered_for_dispatch() {
        let (_dir, store) = open_tmp();
        let catalog = email_only_catalog();
        store
            .insert_lead(
                NewLead {
                    business_name: "Acme Roofing".to_string(),
                    owner_name: Some("Dana Reyes".to_string()),
                    email: Some("dana@acme.com".to_string()),
                    ..Default::default()
                },
                t0(),
            )
            .unwrap();
        let scheduler = Scheduler::new(&store, &catalog, utc_policy(Caps::default()));
        let dispatcher = Recording::new(DispatchStatus::Sent);
        scheduler.tick(t0(), &dispatcher).unwrap();

        let seen = dispatcher.seen.lock().unwrap();
        assert_eq!(seen[0].to, "dana@acme.com");
        assert_eq!(seen[0].subject.as_deref(), Some("Hi Acme Roofing"));
        assert_eq!(seen[0].rendered_content, "Step Dana");
    }

    /// Opts the lead out while holding the attempt, then reports it sent.
    struct OptOutDuringDispatch<'a> {
        store: &'a LeadStore,
        seen: Mutex<Vec<u64>>,
    }

    impl Dispatcher for OptOutDuringDispatch<'_> {
        fn dispatch(&self, req: &DispatchRequest) -> Result<DispatchOutcome> {
            self.seen.lock().unwrap().push(req.lead_id);
            self.store.opt_out(req.lead_id, None, "STOP", t0())?;
            Ok(DispatchOutcome::sent(None))
        }
    }

    #[test]
    fn opt_out_during_dispatch_keeps_real_outcome() {
        let (_dir, store) = open_tmp();
        let catalog = email_only_catalog();
        let lead = email_lead(&store, 1, t0());
        let scheduler = Scheduler::new(&store, &catalog, utc_policy(Caps::default()));

        let report = scheduler
            .tick(t0(), &OptOutDuringDispatch { store: &store, seen: Mutex::new(Vec::new()) })
            .unwrap();
        assert!(report.cancelled.is_empty());
        assert_eq!(report.sent.len(), 1);
        assert_eq!(
            report.sent[0].detail.as_deref(),
            Some("opted out: STOP during dispatch")
        );
        let attempts = store.attempts_for(lead.id).unwrap();
        assert_eq!(attempts[0].status.label(), "sent");
        assert_eq!(store.counter(report.day, Channel::Email).unwrap(), 1);
        assert_eq!(
            scheduler.channel_state(&lead, Channel::Email).unwrap(),
            ChannelState::Stopped
        );
    }

    #[test]
    fn opt_out_during_dispatch_does_not_free_a_slot() {
        let (_dir, store) = open_tmp();
        let catalog = email_only_catalog();
        email_lead(&store, 1, t0() - Duration::minutes(2));
        email_lead(&store, 2, t0() - Duration::minutes(1));
        let caps = Caps {
            email: 1,
            ..Caps::default()
        };
        let scheduler = Scheduler::new(&store, &catalog, utc_policy(caps));
        let dispatcher = OptOutDuringDispatch {
            store: &store,
            seen: Mutex::new(Vec::new()),
        };

        let report = scheduler.tick(t0(), &dispatcher).unwrap();
        assert_eq!(*dispatcher.seen.lock().unwrap(), vec![1]);
        assert_eq!(report.sent.len(), 1);
        assert_eq!(report.deferred.len(), 1);
        assert_eq!(report.deferred[0].lead_id, 2);
        assert_eq!(store.counter(report.day, Channel::Email).unwrap(), 1);
    }

    #[test]
    fn first_step_is_due_immediately_despite_its_delay() {
        let (_dir, store) = open_tmp();
        let catalog = SequenceCatalog::new([1, 2].map(|idx| SequenceStep {
            vertical: "all".to_string(),
            channel: Channel::Email,
            step_index: idx,
            delay_days: 3,
            subject: None,
            template: "hello".to_string(),
        }));
        let lead = email_lead(&store, 1, t0());
        let scheduler = Scheduler::new(&store, &catalog, utc_policy(Caps::default()));

        let due = scheduler.plan(t0()).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].step_index, 1);
        assert_eq!(due[0].due_at, lead.created_at);

        scheduler.tick(t0(), &DryRunDispatcher).unwrap();
        // Later steps still wait out their delay.
        assert!(scheduler.plan(t0() + Duration::days(2)).unwrap().is_empty());
        assert_eq!(scheduler.plan(t0() + Duration::days(3)).unwrap().len(), 1);
    }

    #[test]
    fn stale_pending_attempt_recovered_then_next_step_follows() {
        let (_dir, store) = open_tmp();
        let catalog = email_only_catalog();
        let lead = email_lead(&store, 1, t0() - Duration::days(3));
        store
            .reserve(&ReserveRequest {
                lead_id: lead.id,
                channel: Channel::Email,
                step_index: 1,
                day: NaiveDate::from_ymd_opt(2026, 10, 16).unwrap(),
                cap: 100,
                subject: None,
                content: "x".to_string(),
                now: t0() - Duration::days(3),
            })
            .unwrap();
        let scheduler = Scheduler::new(&store, &catalog, utc_policy(Caps::default()));

        let report = scheduler.tick(t0(), &DryRunDispatcher).unwrap();
        assert_eq!(report.recovered.len(), 1);
        assert_eq!(report.sent.len(), 1);
        assert_eq!(report.sent[0].step_index, 2);
    }

    #[test]
    fn concurrent_ticks_respect_cap_and_never_double_send() {
        let (_dir, store) = open_tmp();
        let catalog = email_only_catalog();
        for n in 0..12 {
            email_lead(&store, n, t0() - Duration::minutes(12 - n as i64));
        }
        let caps = Caps {
            email: 8,
            ..Caps::default()
        };
        let dispatcher = Recording::new(DispatchStatus::Sent);

        let reports: Vec<TickReport> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..3)
                .map(|_| {
                    s.spawn(|| {
                        Scheduler::new(&store, &catalog, utc_policy(caps))
                            .tick(t0(), &dispatcher)
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let sent: usize = reports.iter().map(|r| r.sent.len()).sum();
        assert_eq!(sent, 8);
        let mut leads: Vec<u64> = dispatcher
            .seen
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.lead_id)
            .collect();
        leads.sort_unstable();
        leads.dedup();
        assert_eq!(leads.len(), 8);
        assert_eq!(store.counter(reports[0].day, Channel::Email).unwrap(), 8);
    }

    #[test]
    fn channel_state_progression() {
        let (_dir, store) = open_tmp();
        let catalog = email_only_catalog();
        let lead = email_lead(&store, 1, t0());
        let scheduler = Scheduler::new(&store, &catalog, utc_policy(Caps::default()));
        assert_eq!(
            scheduler.channel_state(&lead, Channel::Email).unwrap(),
            ChannelState::NotStarted
        );
        scheduler.tick(t0(), &DryRunDispatcher).unwrap();
        assert_eq!(
            scheduler.channel_state(&lead, Channel::Email).unwrap(),
            ChannelState::Sent { step: 1, at: t0() }
        );
        // No sms plan in this catalog.
        assert_eq!(
            scheduler.channel_state(&lead, Channel::Sms).unwrap(),
            ChannelState::Completed
        );
    }
}
