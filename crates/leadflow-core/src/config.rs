use crate::counter::{Caps, DayClock};
use crate::error::{LeadflowError, Result};
use crate::paths;
use crate::sequence::{self, RenderContext, SequenceCatalog, SequenceStep};
use crate::types::{Channel, Tier};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

impl ConfigWarning {
    fn warning(message: String) -> Self {
        Self {
            level: WarnLevel::Warning,
            message,
        }
    }

    fn error(message: String) -> Self {
        Self {
            level: WarnLevel::Error,
            message,
        }
    }
}

// ---------------------------------------------------------------------------
// ProjectConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    /// Link offered in templates as `{{signup_url}}`.
    #[serde(default)]
    pub signup_url: String,
    #[serde(default)]
    pub sender_name: String,
}

// ---------------------------------------------------------------------------
// ChannelsConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Leads below this tier are not engaged on the channel.
    #[serde(default)]
    pub min_tier: Tier,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelsConfig {
    #[serde(default)]
    pub email: ChannelConfig,
    #[serde(default)]
    pub sms: ChannelConfig,
    #[serde(default)]
    pub call: ChannelConfig,
}

impl ChannelsConfig {
    pub fn for_channel(&self, channel: Channel) -> &ChannelConfig {
        match channel {
            Channel::Email => &self.email,
            Channel::Sms => &self.sms,
            Channel::Call => &self.call,
        }
    }
}

// ---------------------------------------------------------------------------
// RelayConfig
// ---------------------------------------------------------------------------

/// HTTP endpoint that hands attempts to the actual messaging providers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
    pub url: String,
    #[serde(default = "default_relay_timeout")]
    pub timeout_secs: u64,
}

fn default_relay_timeout() -> u64 {
    10
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    pub project: ProjectConfig,
    #[serde(default)]
    pub caps: Caps,
    /// Fixed offset for the counter day boundary. Host timezone when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utc_offset_minutes: Option<i32>,
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default = "default_recovery_minutes")]
    pub recovery_minutes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relay: Option<RelayConfig>,
    /// Custom sequences. The built-in plans apply when empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sequences: Vec<SequenceStep>,
}

fn default_version() -> u32 {
    1
}

fn default_recovery_minutes() -> u32 {
    60
}

impl Config {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            version: 1,
            project: ProjectConfig {
                name: project_name.into(),
                signup_url: String::new(),
                sender_name: String::new(),
            },
            caps: Caps::default(),
            utc_offset_minutes: None,
            channels: ChannelsConfig::default(),
            recovery_minutes: default_recovery_minutes(),
            relay: None,
            sequences: Vec::new(),
        }
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(LeadflowError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    /// Configured sequences, or the built-in plans when none are configured.
    pub fn catalog(&self) -> SequenceCatalog {
        if self.sequences.is_empty() {
            SequenceCatalog::builtin()
        } else {
            SequenceCatalog::new(self.sequences.iter().cloned())
        }
    }

    pub fn day_clock(&self) -> Result<DayClock> {
        DayClock::from_offset_minutes(self.utc_offset_minutes)
    }

    pub fn render_context(&self) -> RenderContext {
        RenderContext {
            signup_url: self.project.signup_url.clone(),
            sender_name: self.project.sender_name.clone(),
        }
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        for &channel in Channel::all() {
            if self.caps.for_channel(channel) == 0 {
                warnings.push(ConfigWarning::warning(format!(
                    "daily cap for '{channel}' is 0; nothing will be sent on it"
                )));
            }
        }

        if let Err(e) = self.day_clock() {
            warnings.push(ConfigWarning::error(e.to_string()));
        }

        if self.recovery_minutes == 0 {
            warnings.push(ConfigWarning::warning(
                "recovery_minutes is 0; attempts still being dispatched may be marked failed"
                    .to_string(),
            ));
        }

        if let Some(relay) = &self.relay {
            if !(relay.url.starts_with("http://") || relay.url.starts_with("https://")) {
                warnings.push(ConfigWarning::error(format!(
                    "relay url '{}' is not an http(s) url",
                    relay.url
                )));
            }
            if relay.timeout_secs == 0 {
                warnings.push(ConfigWarning::warning(
                    "relay timeout_secs is 0; every dispatch will time out".to_string(),
                ));
            }
        }

        let links_signup = self.sequences.is_empty()
            || self.sequences.iter().any(|s| s.template.contains("signup_url"));
        if links_signup && self.project.signup_url.trim().is_empty() {
            warnings.push(ConfigWarning::warning(
                "project.signup_url is empty; templates will render a blank link".to_string(),
            ));
        }

        self.validate_sequences(&mut warnings);
        warnings
    }

    fn validate_sequences(&self, warnings: &mut Vec<ConfigWarning>) {
        let mut plans: BTreeMap<(String, Channel), Vec<u32>> = BTreeMap::new();
        let mut seen = BTreeSet::new();

        for step in &self.sequences {
            let vertical = step.vertical.to_lowercase();
            let label = format!("{}/{} step {}", vertical, step.channel, step.step_index);

            if !seen.insert((vertical.clone(), step.channel, step.step_index)) {
                warnings.push(ConfigWarning::error(format!("duplicate sequence step {label}")));
            }
            if step.step_index == 0 {
                warnings.push(ConfigWarning::error(format!(
                    "sequence step {label}: step_index starts at 1"
                )));
            }
            if step.template.trim().is_empty() {
                warnings.push(ConfigWarning::error(format!(
                    "sequence step {label} has an empty template"
                )));
            }
            for name in sequence::unknown_placeholders(&step.template) {
                warnings.push(ConfigWarning::warning(format!(
                    "sequence step {label} uses unknown placeholder '{{{{{name}}}}}'"
                )));
            }
            if step.channel == Channel::Email && step.subject.is_none() {
                warnings.push(ConfigWarning::warning(format!(
                    "sequence step {label} has no subject"
                )));
            }
            plans
                .entry((vertical, step.channel))
                .or_default()
                .push(step.step_index);
        }

        for ((vertical, channel), mut indexes) in plans {
            indexes.sort_unstable();
            indexes.dedup();
            let contiguous = indexes
                .iter()
                .enumerate()
                .all(|(i, &idx)| idx == i as u32 + 1);
            if !contiguous {
                warnings.push(ConfigWarning::warning(format!(
                    "sequence {vertical}/{channel} has gaps in its step indexes {indexes:?}"
                )));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
