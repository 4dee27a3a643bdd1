//! Outreach sequences: ordered, templated touchpoints per vertical and channel.

use crate::lead::Lead;
use crate::types::Channel;
use chrono::Duration;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Vertical name whose plan applies when a vertical has none of its own.
pub const ANY_VERTICAL: &str = "all";

pub const PLACEHOLDERS: &[&str] = &[
    "business_name",
    "first_name",
    "city",
    "state",
    "vertical",
    "phone",
    "signup_url",
    "sender_name",
];

// ---------------------------------------------------------------------------
// SequenceStep
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceStep {
    #[serde(default = "default_vertical")]
    pub vertical: String,
    pub channel: Channel,
    /// 1-based position within the (vertical, channel) plan.
    pub step_index: u32,
    /// Wait after the previous attempt on the same channel.
    #[serde(default)]
    pub delay_days: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub template: String,
}

fn default_vertical() -> String {
    ANY_VERTICAL.to_string()
}

impl SequenceStep {
    pub fn delay(&self) -> Duration {
        Duration::days(i64::from(self.delay_days))
    }
}

// ---------------------------------------------------------------------------
// SequenceCatalog
// ---------------------------------------------------------------------------

/// Immutable step definitions, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct SequenceCatalog {
    plans: BTreeMap<(String, Channel), Vec<SequenceStep>>,
}

impl SequenceCatalog {
    pub fn new(steps: impl IntoIterator<Item = SequenceStep>) -> Self {
        let mut plans: BTreeMap<(String, Channel), Vec<SequenceStep>> = BTreeMap::new();
        for step in steps {
            plans
                .entry((step.vertical.to_lowercase(), step.channel))
                .or_default()
                .push(step);
        }
        for plan in plans.values_mut() {
            plan.sort_by_key(|s| s.step_index);
        }
        Self { plans }
    }

    /// Built-in plans used when the config defines none.
    pub fn builtin() -> Self {
        Self::new(default_steps())
    }

    /// The plan for `vertical` on `channel`, falling back to the `all` plan.
    pub fn steps(&self, vertical: &str, channel: Channel) -> &[SequenceStep] {
        self.plans
            .get(&(vertical.to_lowercase(), channel))
            .or_else(|| self.plans.get(&(ANY_VERTICAL.to_string(), channel)))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn step(&self, vertical: &str, channel: Channel, step_index: u32) -> Option<&SequenceStep> {
        self.steps(vertical, channel)
            .iter()
            .find(|s| s.step_index == step_index)
    }

    /// The step that follows `after` (or the first step when `after` is None).
    pub fn next_step(
        &self,
        vertical: &str,
        channel: Channel,
        after: Option<u32>,
    ) -> Option<&SequenceStep> {
        let plan = self.steps(vertical, channel);
        match after {
            None => plan.first(),
            Some(i) => plan.iter().find(|s| s.step_index > i),
        }
    }

    pub fn all_steps(&self) -> impl Iterator<Item = &SequenceStep> {
        self.plans.values().flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Values available to templates besides the lead's own fields.
#[derive(Debug, Clone, Default)]
pub struct RenderContext {
    pub signup_url: String,
    pub sender_name: String,
}

static PLACEHOLDER_RE: OnceLock<Regex> = OnceLock::new();

fn placeholder_re() -> &'static Regex {
    PLACEHOLDER_RE
        .get_or_init(|| Regex::new(r"\{\{\s*([a-z_]+)\s*\}\}").expect("placeholder regex is valid"))
}

/// Placeholder names used in `template` that `render` does not know.
pub fn unknown_placeholders(template: &str) -> Vec<String> {
    placeholder_re()
        .captures_iter(template)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .filter(|name| !PLACEHOLDERS.contains(name))
        .map(str::to_string)
        .collect()
}

/// Substitute `{{placeholder}}` tokens with lead data. Unknown tokens are kept.
pub fn render(template: &str, lead: &Lead, ctx: &RenderContext) -> String {
    placeholder_re()
        .replace_all(template, |caps: &regex::Captures<'_>| {
            let name = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            match name {
                "business_name" => lead.business_name.clone(),
                "first_name" => lead.first_name().to_string(),
                "city" => lead.city.clone().unwrap_or_else(|| "your city".to_string()),
                "state" => lead.state.clone().unwrap_or_default(),
                "vertical" => lead.vertical.clone(),
                "phone" => lead.phone.clone().unwrap_or_default(),
                "signup_url" => ctx.signup_url.clone(),
                "sender_name" => ctx.sender_name.clone(),
                _ => caps[0].to_string(),
            }
        })
        .into_owned()
}

// ---------------------------------------------------------------------------
// Built-in plans
// ---------------------------------------------------------------------------

const EMAIL_DELAYS: [u32; 6] = [0, 2, 4, 7, 14, 21];
const SMS_DELAYS: [u32; 3] = [0, 2, 5];
const CALL_DELAYS: [u32; 3] = [0, 3, 7];

fn default_steps() -> Vec<SequenceStep> {
    let email_bodies = [
        (
            "Quick question about {{business_name}}",
            "Hey {{first_name}},\n\nHow many calls does {{business_name}} miss while you're on a job? \
             Most {{vertical}} businesses in {{city}} lose several a day to voicemail.\n\n\
             Worth a quick look? {{signup_url}}\n\n- {{sender_name}}",
        ),
        (
            "Re: {{business_name}}",
            "Hey {{first_name}}, following up on my last note. One captured call usually pays \
             for months of service.\n\n{{signup_url}}\n\n- {{sender_name}}",
        ),
        (
            "After-hours calls at {{business_name}}",
            "{{first_name}}, a large share of {{vertical}} calls come in after 5pm and on \
             weekends. Who picks those up today?\n\n{{signup_url}}\n\n- {{sender_name}}",
        ),
        (
            "Free trial for {{business_name}}",
            "Hey {{first_name}}, the trial takes about ten minutes to set up and costs nothing. \
             {{signup_url}}\n\n- {{sender_name}}",
        ),
        (
            "Still missing calls?",
            "{{first_name}}, checking in one more time for {{business_name}}. \
             {{signup_url}}\n\n- {{sender_name}}",
        ),
        (
            "Closing the loop",
            "Hey {{first_name}}, I'll stop reaching out after this one. If the timing is ever \
             right: {{signup_url}}\n\n- {{sender_name}}",
        ),
    ];
    let sms_bodies = [
        "Hey {{first_name}}! {{sender_name}} here. Quick Q: who answers the phone at \
         {{business_name}} when you're on a job? {{signup_url}}",
        "Hey {{first_name}}, following up. One captured call can pay for months. Try free: {{signup_url}}",
        "{{first_name}} - last text from me. Your competitors answer at 10pm. {{signup_url}}",
    ];
    let call_briefs = [
        "Intro call to {{business_name}} ({{vertical}}, {{city}} {{state}}). Ask for {{first_name}}; \
         goal: start the free trial.",
        "Follow-up call to {{business_name}}. Reference earlier outreach; offer to walk through setup.",
        "Final call to {{business_name}}. Offer the trial link by text: {{signup_url}}",
    ];

    let mut steps = Vec::new();
    for (i, (delay, (subject, body))) in EMAIL_DELAYS.iter().zip(email_bodies).enumerate() {
        steps.push(SequenceStep {
            vertical: default_vertical(),
            channel: Channel::Email,
            step_index: i as u32 + 1,
            delay_days: *delay,
            subject: Some(subject.to_string()),
            template: body.to_string(),
        });
    }
    for (channel, delays, bodies) in [
        (Channel::Sms, SMS_DELAYS, sms_bodies),
        (Channel::Call, CALL_DELAYS, call_briefs),
    ] {
        for (i, (delay, body)) in delays.iter().zip(bodies).enumerate() {
            steps.push(SequenceStep {
                vertical: default_vertical(),
                channel,
                step_index: i as u32 + 1,
                delay_days: *delay,
                subject: None,
                template: body.to_string(),
            });
        }
    }
    steps
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
