use crate::logic::types::SyncType;
use crate::utils::config_loader::LoadConfigError;

/// Upstream payload that parsed but does not describe a usable record
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{source_name}: {reason}")]
pub struct ValidationError {
    pub source_name: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },
    #[error("constraint violated: {0}")]
    Conflict(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    // Upstream access
    #[error("{source_name} request failed: {message}")]
    Transport { source_name: String, message: String },
    #[error("{source_name} returned HTTP {status}: {body}")]
    UpstreamStatus { source_name: String, status: u16, body: String },
    #[error("{source_name} payload could not be decoded: {message}")]
    Decode { source_name: String, message: String },
    #[error("invalid payload from {0}")]
    Validation(#[from] ValidationError),

    // Persistence
    #[error(transparent)]
    Store(#[from] StoreError),

    // Run coordination
    #[error("a {0} sync is already running")]
    RunInProgress(SyncType),
    #[error(transparent)]
    Config(#[from] LoadConfigError),
}

impl SyncError {
    pub fn transport(source_name: &str, message: impl ToString) -> Self {
        Self::Transport {
            source_name: source_name.to_string(),
            message: message.to_string(),
        }
    }

    pub fn decode(source_name: &str, message: impl ToString) -> Self {
        Self::Decode {
            source_name: source_name.to_string(),
            message: message.to_string(),
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
