//! Hand-off of reserved attempts to whatever actually sends them.
//!
//! The scheduler never talks to a messaging provider directly. It renders
//! the step, builds a [`DispatchRequest`] and writes back the
//! [`DispatchOutcome`] the dispatcher returns.

use crate::config::RelayConfig;
use crate::error::{LeadflowError, Result};
use crate::types::Channel;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchRequest {
    pub attempt_id: Uuid,
    pub lead_id: u64,
    pub channel: Channel,
    /// Email address or phone number.
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub rendered_content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    Sent,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchOutcome {
    pub status: DispatchStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DispatchOutcome {
    pub fn sent(provider_ref: Option<String>) -> Self {
        Self {
            status: DispatchStatus::Sent,
            provider_ref,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: DispatchStatus::Failed,
            provider_ref: None,
            error: Some(error.into()),
        }
    }
}

/// Sends one rendered attempt.
///
/// Delivery problems are reported as a `Failed` outcome. The scheduler
/// records an `Err` the same way, with the error text as the reason.
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, req: &DispatchRequest) -> Result<DispatchOutcome>;
}

// ---------------------------------------------------------------------------
// DryRunDispatcher
// ---------------------------------------------------------------------------

/// Accepts everything without contacting anyone.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunDispatcher;

impl Dispatcher for DryRunDispatcher {
    fn dispatch(&self, req: &DispatchRequest) -> Result<DispatchOutcome> {
        debug!(
            lead_id = req.lead_id,
            channel = %req.channel,
            to = %req.to,
            "dry run dispatch"
        );
        Ok(DispatchOutcome::sent(Some(format!("dry-run-{}", req.attempt_id))))
    }
}

// ---------------------------------------------------------------------------
// RelayDispatcher
// ---------------------------------------------------------------------------

/// POSTs each request as JSON to an HTTP relay.
///
/// The relay answers 2xx with `{"status": "sent"|"failed", "provider_ref", "error"}`.
/// Retrying belongs to the relay; a timeout or non-2xx answer fails the attempt.
pub struct RelayDispatcher {
    client: reqwest::blocking::Client,
    url: String,
}

#[derive(Debug, Deserialize)]
struct RelayResponse {
    #[serde(default)]
    status: Option<DispatchStatus>,
    #[serde(default)]
    provider_ref: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl RelayDispatcher {
    pub fn new(config: &RelayConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LeadflowError::Dispatch(format!("building relay client: {e}")))?;
        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }
}

impl Dispatcher for RelayDispatcher {
    fn dispatch(&self, req: &DispatchRequest) -> Result<DispatchOutcome> {
        let response = match self.client.post(&self.url).json(req).send() {
            Ok(r) => r,
            Err(e) => {
                warn!(lead_id = req.lead_id, channel = %req.channel, error = %e, "relay unreachable");
                return Ok(DispatchOutcome::failed(format!("relay request failed: {e}")));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            warn!(lead_id = req.lead_id, channel = %req.channel, %status, "relay rejected attempt");
            return Ok(DispatchOutcome::failed(format!(
                "relay returned {status}: {}",
                body.trim()
            )));
        }

        let parsed: RelayResponse = match response.json() {
            Ok(p) => p,
            Err(e) => return Ok(DispatchOutcome::failed(format!("unreadable relay response: {e}"))),
        };
        Ok(match parsed.status {
            Some(DispatchStatus::Sent) => DispatchOutcome::sent(parsed.provider_ref),
            Some(DispatchStatus::Failed) => DispatchOutcome {
                status: DispatchStatus::Failed,
                provider_ref: parsed.provider_ref,
                error: Some(parsed.error.unwrap_or_else(|| "relay reported failure".to_string())),
            },
            None => {
                warn!(lead_id = req.lead_id, channel = %req.channel, "relay response has no status");
                DispatchOutcome::failed("unreadable relay response: missing status")
            }
        })
    }
}
