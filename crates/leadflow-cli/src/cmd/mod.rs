pub mod attempt;
pub mod config;
pub mod due;
pub mod event;
pub mod init;
pub mod lead;
pub mod optout;
pub mod stats;
pub mod tick;

use anyhow::Context;
use chrono::{DateTime, Utc};
use leadflow_core::{config::Config, paths, store::LeadStore, LeadflowError};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::warn;

/// How long a command waits for another leadflow process to release the store.
const STORE_LOCK_WAIT: Duration = Duration::from_secs(30);
const BACKOFF_BASE: Duration = Duration::from_millis(50);
const BACKOFF_MAX: Duration = Duration::from_secs(2);

/// Loaded config plus the open lead store.
pub struct Project {
    pub config: Config,
    pub store: LeadStore,
}

pub fn open(root: &Path) -> anyhow::Result<Project> {
    let config = Config::load(root).context("failed to load config")?;
    let store = open_store(&paths::db_path(root), STORE_LOCK_WAIT)?;
    Ok(Project { config, store })
}

/// Open the lead store, waiting up to `wait` while another process (a
/// running tick, say) holds its lock.
pub fn open_store(path: &Path, wait: Duration) -> anyhow::Result<LeadStore> {
    let deadline = Instant::now() + wait;
    let mut backoff = BACKOFF_BASE;
    loop {
        match LeadStore::open(path) {
            Ok(store) => return Ok(store),
            Err(LeadflowError::StoreLocked(_)) if Instant::now() < deadline => {
                warn!(
                    path = %path.display(),
                    retry_in_ms = backoff.as_millis() as u64,
                    "lead store is busy; waiting"
                );
                std::thread::sleep(backoff.min(deadline.saturating_duration_since(Instant::now())));
                backoff = backoff.saturating_mul(2).min(BACKOFF_MAX);
            }
            Err(e) => return Err(e).context("failed to open lead store"),
        }
    }
}

/// `--now` override, or the current time.
pub fn parse_now(now: Option<&str>) -> anyhow::Result<DateTime<Utc>> {
    match now {
        Some(s) => Ok(DateTime::parse_from_rfc3339(s)
            .with_context(|| format!("invalid --now '{s}', expected RFC 3339"))?
            .with_timezone(&Utc)),
        None => Ok(Utc::now()),
    }
}
