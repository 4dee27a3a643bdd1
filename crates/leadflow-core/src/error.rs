use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum LeadflowError {
    #[error("not initialized: run 'leadflow init'")]
    NotInitialized,

    #[error("lead not found: {0}")]
    LeadNotFound(u64),

    #[error("lead already exists: {0}")]
    DuplicateLead(String),

    #[error("invalid lead: {0}")]
    InvalidLead(String),

    #[error("attempt not found: {0}")]
    AttemptNotFound(Uuid),

    #[error("invalid channel: {0}")]
    InvalidChannel(String),

    #[error("invalid stage: {0}")]
    InvalidStage(String),

    #[error("invalid event kind: {0}")]
    InvalidEventKind(String),

    #[error("invalid tier: {0}")]
    InvalidTier(String),

    #[error("invalid transition from {from} to {to}: {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("lead store is locked by another process: {0}")]
    StoreLocked(String),

    #[error("lead store error: {0}")]
    Store(String),

    #[error("dispatch error: {0}")]
    Dispatch(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LeadflowError>;

/// Flatten a redb error into `LeadflowError::Store`.
pub(crate) fn store_err(e: impl std::fmt::Display) -> LeadflowError {
    LeadflowError::Store(e.to_string())
}
