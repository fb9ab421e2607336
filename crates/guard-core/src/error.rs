//! Error types for the risk guard.

use thiserror::Error;

use crate::types::{FindingId, UserId};

/// Top-level error.
#[derive(Error, Debug)]
pub enum GuardError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("Exchange still failing after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: ExchangeError },

    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),

    #[error("Persistence error: {0}")]
    Store(#[from] StoreError),

    #[error("Unknown user: {0}")]
    UnknownUser(UserId),

    #[error("User already registered: {0}")]
    AlreadyRegistered(UserId),

    #[error("Finding not found: {0}")]
    FindingNotFound(FindingId),

    #[error("State actor for user {0} has stopped")]
    ActorStopped(UserId),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GuardError {
    /// Whether this error means the user's credentials must be refreshed
    /// before another cycle can succeed.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            GuardError::Exchange(ExchangeError::AuthFailure(_))
                | GuardError::RetriesExhausted {
                    last: ExchangeError::AuthFailure(_),
                    ..
                }
        )
    }
}

/// Exchange snapshot source errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    #[error("Request timed out")]
    Timeout,

    #[error("Authentication failed: {0}")]
    AuthFailure(String),

    #[error("Rate limited: retry after {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    #[error("API error: {0}")]
    Api(String),
}

impl ExchangeError {
    /// Timeouts and rate limits are worth retrying; everything else is not.
    pub fn is_transient(&self) -> bool {
        matches!(self, ExchangeError::Timeout | ExchangeError::RateLimited { .. })
    }
}

/// Notification sink errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("Recipient unreachable: {0}")]
    Unreachable(String),

    #[error("Delivery timed out")]
    Timeout,

    #[error("Message rejected: {0}")]
    Rejected(String),
}

impl NotifyError {
    pub fn is_transient(&self) -> bool {
        matches!(self, NotifyError::Unreachable(_) | NotifyError::Timeout)
    }
}

/// State store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Store timed out")]
    Timeout,

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Result type alias for guard operations.
pub type GuardResult<T> = Result<T, GuardError>;
